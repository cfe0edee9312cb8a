//! Turns provider specifications into providers.
//!
//! Accepted string forms:
//! - `openai:chat:<model>` / `openai:completion:<model>`
//! - `openai:chat` / `openai:completion` (family default model)
//! - `openai:<model>` for a model known to one family
//! - anything else is a filesystem path handed to the [`PluginLoader`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::ProviderEnv;
use crate::error::LoadError;
use crate::plugin::{DefaultPluginLoader, PluginLoader};
use crate::providers::openai::{
    CHAT_MODELS, COMPLETION_MODELS, DEFAULT_CHAT_MODEL, DEFAULT_COMPLETION_MODEL,
};
use crate::providers::{
    ApiProvider, LabeledProvider, OpenAiChatProvider, OpenAiCompletionProvider, OpenAiSettings,
    ProviderOptions, ProviderSpec,
};

const OPENAI_PREFIX: &str = "openai:";

#[derive(Clone)]
pub struct ProviderLoader {
    env: ProviderEnv,
    cache: Arc<ResponseCache>,
    plugins: Arc<dyn PluginLoader>,
    base_dir: Option<PathBuf>,
}

impl ProviderLoader {
    pub fn new(env: ProviderEnv) -> Self {
        Self {
            env,
            cache: Arc::new(ResponseCache::new()),
            plugins: Arc::new(DefaultPluginLoader::default()),
            base_dir: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_plugins(mut self, plugins: Arc<dyn PluginLoader>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Directory that relative provider paths resolve against. Defaults to
    /// the process working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn load(&self, spec: &str) -> Result<Arc<dyn ApiProvider>, LoadError> {
        self.load_with_options(spec, &ProviderOptions::default()).await
    }

    pub async fn load_with_options(
        &self,
        spec: &str,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ApiProvider>, LoadError> {
        tracing::debug!(spec, "loading provider");
        let provider = if spec.starts_with(OPENAI_PREFIX) {
            self.load_openai(spec, options)?
        } else {
            let path = self.resolve_path(spec);
            self.plugins.load(spec, &path, &self.env).await?
        };
        Ok(LabeledProvider::wrap(provider, options.label.as_deref()))
    }

    /// Resolve any specification form. Already-resolved providers are returned as is.
    pub async fn resolve(&self, spec: &ProviderSpec) -> Result<Arc<dyn ApiProvider>, LoadError> {
        match spec {
            ProviderSpec::Id(id) => self.load(id).await,
            ProviderSpec::Options(options) => {
                let id = options
                    .id
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| {
                        LoadError::MissingProviderId(
                            serde_json::to_string(options).unwrap_or_else(|_| format!("{options:?}")),
                        )
                    })?;
                self.load_with_options(id, options).await
            }
            ProviderSpec::Resolved(provider) => Ok(provider.clone()),
        }
    }

    pub async fn resolve_all(
        &self,
        specs: &[ProviderSpec],
    ) -> Result<Vec<Arc<dyn ApiProvider>>, LoadError> {
        let mut providers = Vec::with_capacity(specs.len());
        for spec in specs {
            providers.push(self.resolve(spec).await?);
        }
        Ok(providers)
    }

    fn resolve_path(&self, spec: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(spec),
            None => Path::new(spec).to_path_buf(),
        }
    }

    fn load_openai(
        &self,
        spec: &str,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn ApiProvider>, LoadError> {
        let mut parts = spec.splitn(3, ':').skip(1);
        let kind = parts.next().unwrap_or_default();
        let model = parts.next().filter(|m| !m.is_empty());

        let family = match kind {
            "chat" => Family::Chat(model.unwrap_or(DEFAULT_CHAT_MODEL)),
            "completion" => Family::Completion(model.unwrap_or(DEFAULT_COMPLETION_MODEL)),
            m if CHAT_MODELS.contains(&m) => Family::Chat(m),
            m if COMPLETION_MODELS.contains(&m) => Family::Completion(m),
            _ => return Err(LoadError::UnknownModelType(spec.to_string())),
        };

        let settings = OpenAiSettings::resolve(&self.env, &options.config)?;
        Ok(match family {
            Family::Chat(model) => Arc::new(OpenAiChatProvider::new(model, settings, self.cache.clone())?),
            Family::Completion(model) => {
                Arc::new(OpenAiCompletionProvider::new(model, settings, self.cache.clone())?)
            }
        })
    }
}

enum Family<'a> {
    Chat(&'a str),
    Completion(&'a str),
}

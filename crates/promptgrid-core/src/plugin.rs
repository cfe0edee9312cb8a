//! Loading custom providers from filesystem paths.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProviderEnv;
use crate::error::PluginError;
use crate::providers::{ApiProvider, ScriptProvider};

/// Zero-argument constructor for a custom provider.
pub trait ProviderFactory: Send + Sync {
    fn create(&self) -> anyhow::Result<Arc<dyn ApiProvider>>;
}

impl<F> ProviderFactory for F
where
    F: Fn() -> anyhow::Result<Arc<dyn ApiProvider>> + Send + Sync,
{
    fn create(&self) -> anyhow::Result<Arc<dyn ApiProvider>> {
        self()
    }
}

#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// `spec` is the path as the user wrote it; `path` is resolved against the
    /// loader's base directory.
    async fn load(
        &self,
        spec: &str,
        path: &Path,
        env: &ProviderEnv,
    ) -> Result<Arc<dyn ApiProvider>, PluginError>;
}

/// Factories registered by path.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    factories: HashMap<PathBuf, Arc<dyn ProviderFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, path: impl AsRef<Path>, factory: impl ProviderFactory + 'static) -> Self {
        self.factories.insert(normalize(path.as_ref()), Arc::new(factory));
        self
    }

    pub fn get(&self, path: &Path) -> Option<&Arc<dyn ProviderFactory>> {
        self.factories.get(&normalize(path))
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Registered factories first, then executables on disk.
#[derive(Default)]
pub struct DefaultPluginLoader {
    registry: PluginRegistry,
}

impl DefaultPluginLoader {
    pub fn new(registry: PluginRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PluginLoader for DefaultPluginLoader {
    async fn load(
        &self,
        spec: &str,
        path: &Path,
        env: &ProviderEnv,
    ) -> Result<Arc<dyn ApiProvider>, PluginError> {
        if let Some(factory) = self.registry.get(path) {
            tracing::debug!(path = %path.display(), "constructing registered provider");
            return Ok(factory.create()?);
        }

        tokio::fs::metadata(path).await?;
        tracing::debug!(path = %path.display(), "loading script provider");
        Ok(Arc::new(ScriptProvider::new(spec, path, env.request_timeout())))
    }
}

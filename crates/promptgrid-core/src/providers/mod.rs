//! Provider adapters and the specifications that name them.
//!
//! An [`ApiProvider`] turns one prompt string into a [`ProviderResponse`].
//! Users describe providers with a [`ProviderSpec`]: a string such as
//! `"openai:chat:gpt-4"`, an options object carrying an `id`, or a provider
//! value that is already constructed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use promptgrid_types::{ProviderResponse, TokenUsage};

pub mod function;
pub mod openai;
pub mod script;

pub use function::from_async_fn;
pub use openai::{OpenAiChatProvider, OpenAiCompletionProvider, OpenAiSettings};
pub use script::ScriptProvider;

#[async_trait]
pub trait ApiProvider: Send + Sync {
    /// Stable identifier, e.g. `openai:gpt-4`.
    fn id(&self) -> &str;

    /// Human-readable name for reports.
    fn label(&self) -> &str {
        self.id()
    }

    /// Never returns an error out of band: failures come back as
    /// [`ProviderResponse::Error`].
    async fn call_api(&self, prompt: &str) -> ProviderResponse;
}

/// Per-provider overrides accepted in options-form specifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub config: ProviderConfig,
}

impl ProviderOptions {
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub enum ProviderSpec {
    Id(String),
    Options(ProviderOptions),
    Resolved(Arc<dyn ApiProvider>),
}

impl ProviderSpec {
    pub fn resolved(&self) -> Option<&Arc<dyn ApiProvider>> {
        match self {
            Self::Resolved(provider) => Some(provider),
            _ => None,
        }
    }
}

impl fmt::Debug for ProviderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.debug_tuple("Id").field(id).finish(),
            Self::Options(options) => f.debug_tuple("Options").field(options).finish(),
            Self::Resolved(provider) => f.debug_tuple("Resolved").field(&provider.id()).finish(),
        }
    }
}

impl From<&str> for ProviderSpec {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<ProviderOptions> for ProviderSpec {
    fn from(options: ProviderOptions) -> Self {
        Self::Options(options)
    }
}

impl From<Arc<dyn ApiProvider>> for ProviderSpec {
    fn from(provider: Arc<dyn ApiProvider>) -> Self {
        Self::Resolved(provider)
    }
}

impl<'de> Deserialize<'de> for ProviderSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Id(String),
            Options(ProviderOptions),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Self::Id(id),
            Raw::Options(options) => Self::Options(options),
        })
    }
}

impl Serialize for ProviderSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Id(id) => serializer.serialize_str(id),
            Self::Options(options) => options.serialize(serializer),
            Self::Resolved(provider) => serializer.serialize_str(provider.id()),
        }
    }
}

/// Gives a provider a display label without changing its id.
pub(crate) struct LabeledProvider {
    inner: Arc<dyn ApiProvider>,
    label: String,
}

impl LabeledProvider {
    pub(crate) fn wrap(inner: Arc<dyn ApiProvider>, label: Option<&str>) -> Arc<dyn ApiProvider> {
        match label {
            Some(label) => Arc::new(Self {
                inner,
                label: label.to_string(),
            }),
            None => inner,
        }
    }
}

#[async_trait]
impl ApiProvider for LabeledProvider {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn label(&self) -> &str {
        &self.label
    }

    async fn call_api(&self, prompt: &str) -> ProviderResponse {
        self.inner.call_api(prompt).await
    }
}

use thiserror::Error;

/// Failure to turn a provider specification into a provider.
///
/// Configuration problems surface here before any provider traffic; plugin
/// failures are passed through untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("OpenAI API key is not set. Set the OPENAI_API_KEY environment variable or add `api_key` to the provider config")]
    MissingApiKey,

    #[error("provider object is missing an `id` field: {0}")]
    MissingProviderId(String),

    #[error("unknown OpenAI model type: {0}. Use one of the following providers: openai:chat:<model name>, openai:completion:<model name>, openai:<model name>")]
    UnknownModelType(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Plugin(#[from] PluginError),
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Factory(#[from] anyhow::Error),
}

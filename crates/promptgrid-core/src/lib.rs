//! promptgrid-core: run prompt × provider × test matrices against LLM providers.
//! Describe a suite (providers, prompts, tests with assertions), then call
//! [`evaluate`] or build an [`Evaluator`] with your own collaborators.
//! See `examples/simple.rs` for a quickstart.

pub mod cache;
pub mod config;
pub mod datasource;
pub mod error;
pub mod evaluate;
pub mod loader;
pub mod output;
pub mod plugin;
pub mod prompts;
pub mod providers;
pub mod resolver;
pub mod runner;
pub mod scorer;
pub mod scorers;
pub mod telemetry;
pub mod testing;
pub mod types;

pub use cache::ResponseCache;
pub use config::{load_suite, ProviderEnv};
pub use datasource::{FileTestLoader, TestLoader};
pub use error::{LoadError, PluginError};
pub use evaluate::{evaluate, Evaluator, EvaluatorBuilder};
pub use loader::ProviderLoader;
#[cfg(feature = "persistence")]
pub use output::SqliteLatestResults;
pub use output::{FileOutputWriter, JsonLatestResults, LatestResultsWriter, OutputWriter};
pub use plugin::{DefaultPluginLoader, PluginLoader, PluginRegistry, ProviderFactory};
pub use prompts::normalize_prompts;
pub use providers::{
    from_async_fn, ApiProvider, OpenAiChatProvider, OpenAiCompletionProvider, ProviderConfig,
    ProviderOptions, ProviderSpec,
};
pub use resolver::resolve_nested_providers;
pub use runner::{EvaluationEngine, MatrixEngine};
pub use scorer::Scorer;
pub use telemetry::{NoopTelemetry, Telemetry, TracingTelemetry};
pub use types::{
    Assertion, AssertionKind, CellResult, EvaluateOptions, EvaluateTestSuite, EvaluationResult,
    EvaluationStats, OutputPath, PromptEntry, ProviderResponse, Score, TestCase, TestSource, TestSuite,
    TokenUsage,
};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use crate::cache::ResponseCache;
use crate::config::ProviderEnv;
use crate::datasource::{FileTestLoader, TestLoader};
use crate::loader::ProviderLoader;
use crate::output::{FileOutputWriter, JsonLatestResults, LatestResultsWriter, OutputWriter};
use crate::plugin::{DefaultPluginLoader, PluginLoader};
use crate::prompts::normalize_prompts;
use crate::resolver::resolve_nested_providers;
use crate::runner::{EvaluationEngine, MatrixEngine};
use crate::telemetry::{Telemetry, TracingTelemetry};
use crate::types::{EvaluateOptions, EvaluateTestSuite, EvaluationResult, TestSuite};

pub struct EvaluatorBuilder {
	engine: Option<Arc<dyn EvaluationEngine>>,
	test_loader: Option<Arc<dyn TestLoader>>,
	output_writer: Option<Arc<dyn OutputWriter>>,
	latest_results: Option<Arc<dyn LatestResultsWriter>>,
	telemetry: Option<Arc<dyn Telemetry>>,
	provider_env: Option<ProviderEnv>,
	plugins: Option<Arc<dyn PluginLoader>>,
	test_base_dir: Option<PathBuf>,
	provider_base_dir: Option<PathBuf>,
}

impl EvaluatorBuilder {
	pub fn new() -> Self {
		Self {
			engine: None,
			test_loader: None,
			output_writer: None,
			latest_results: None,
			telemetry: None,
			provider_env: None,
			plugins: None,
			test_base_dir: None,
			provider_base_dir: None,
		}
	}

	pub fn engine(mut self, engine: Arc<dyn EvaluationEngine>) -> Self {
		self.engine = Some(engine);
		self
	}

	pub fn test_loader(mut self, test_loader: Arc<dyn TestLoader>) -> Self {
		self.test_loader = Some(test_loader);
		self
	}

	pub fn output_writer(mut self, output_writer: Arc<dyn OutputWriter>) -> Self {
		self.output_writer = Some(output_writer);
		self
	}

	pub fn latest_results(mut self, latest_results: Arc<dyn LatestResultsWriter>) -> Self {
		self.latest_results = Some(latest_results);
		self
	}

	pub fn telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
		self.telemetry = Some(telemetry);
		self
	}

	pub fn provider_env(mut self, env: ProviderEnv) -> Self {
		self.provider_env = Some(env);
		self
	}

	pub fn plugins(mut self, plugins: Arc<dyn PluginLoader>) -> Self {
		self.plugins = Some(plugins);
		self
	}

	/// Directory that relative test file paths resolve against, usually the
	/// suite file's directory. Ignored when a custom test loader is set.
	pub fn test_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.test_base_dir = Some(dir.into());
		self
	}

	/// Directory that relative custom provider paths resolve against.
	/// Defaults to the process working directory.
	pub fn provider_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.provider_base_dir = Some(dir.into());
		self
	}

	/// Unset collaborators fall back to the defaults: [`MatrixEngine`],
	/// [`FileTestLoader`], [`FileOutputWriter`], [`JsonLatestResults`],
	/// [`TracingTelemetry`] and the process environment.
	pub fn build(self) -> Evaluator {
		let test_loader = self.test_loader.unwrap_or_else(|| match &self.test_base_dir {
			Some(dir) => Arc::new(FileTestLoader::with_base_dir(dir)),
			None => Arc::new(FileTestLoader::new()),
		});
		Evaluator {
			engine: self.engine.unwrap_or_else(|| Arc::new(MatrixEngine::new())),
			test_loader,
			output_writer: self.output_writer.unwrap_or_else(|| Arc::new(FileOutputWriter)),
			latest_results: self.latest_results.unwrap_or_else(|| Arc::new(JsonLatestResults::default())),
			telemetry: self.telemetry.unwrap_or_else(|| Arc::new(TracingTelemetry::new())),
			provider_env: self.provider_env.unwrap_or_else(ProviderEnv::from_process),
			plugins: self.plugins.unwrap_or_else(|| Arc::new(DefaultPluginLoader::default())),
			provider_base_dir: self.provider_base_dir,
		}
	}
}

impl Default for EvaluatorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Prepares a suite as written by the user and hands it to an engine.
pub struct Evaluator {
	engine: Arc<dyn EvaluationEngine>,
	test_loader: Arc<dyn TestLoader>,
	output_writer: Arc<dyn OutputWriter>,
	latest_results: Arc<dyn LatestResultsWriter>,
	telemetry: Arc<dyn Telemetry>,
	provider_env: ProviderEnv,
	plugins: Arc<dyn PluginLoader>,
	provider_base_dir: Option<PathBuf>,
}

impl Evaluator {
	pub fn builder() -> EvaluatorBuilder {
		EvaluatorBuilder::new()
	}

	/// Provider loader bound to one run's response cache.
	pub fn provider_loader(&self, cache: Arc<ResponseCache>) -> ProviderLoader {
		let loader = ProviderLoader::new(self.provider_env.clone())
			.with_cache(cache)
			.with_plugins(self.plugins.clone());
		match &self.provider_base_dir {
			Some(dir) => loader.with_base_dir(dir),
			None => loader,
		}
	}

	/// Resolve providers, load tests, normalize prompts and resolve nested
	/// providers. The input suite is left untouched.
	pub async fn prepare(&self, suite: &EvaluateTestSuite, loader: &ProviderLoader) -> Result<TestSuite> {
		let providers = loader.resolve_all(&suite.providers).await?;
		let mut tests = self.test_loader.load(&suite.tests, suite.default_test.as_ref()).await?;
		let prompts = normalize_prompts(&suite.prompts);
		resolve_nested_providers(&mut tests, loader).await?;

		Ok(TestSuite {
			description: suite.description.clone(),
			providers,
			prompts,
			tests,
		})
	}

	pub async fn evaluate(
		&self,
		suite: &EvaluateTestSuite,
		options: &EvaluateOptions,
	) -> Result<EvaluationResult> {
		let cache = Arc::new(ResponseCache::new());
		let loader = self.provider_loader(cache.clone());
		let prepared = self.prepare(suite, &loader).await?;

		if options.cache == Some(false) {
			cache.disable();
		}
		self.telemetry.maybe_show_notice();

		tracing::info!(
			providers = prepared.providers.len(),
			prompts = prepared.prompts.len(),
			tests = prepared.tests.len(),
			"starting evaluation"
		);
		let result = self.engine.run(&prepared, options).await?;

		if let Some(output_path) = &suite.output_path {
			for path in output_path.paths() {
				if let Err(err) = self.output_writer.write(path, &result, &prepared).await {
					tracing::warn!(path = %path.display(), "failed to write output: {:#}", err);
				}
			}
		}

		if suite.write_latest_results {
			if let Err(err) = self.latest_results.write_latest(&result, &prepared).await {
				tracing::warn!("failed to write latest results: {:#}", err);
			}
		}

		self.telemetry.record(
			"eval_ran",
			json!({
				"providers": prepared.providers.len(),
				"prompts": prepared.prompts.len(),
				"tests": prepared.tests.len(),
				"cells": result.results.len(),
			}),
		);
		if let Err(err) = self.telemetry.send().await {
			tracing::warn!("failed to send telemetry: {:#}", err);
		}

		tracing::info!(
			successes = result.stats.successes,
			failures = result.stats.failures,
			"evaluation complete"
		);
		Ok(result)
	}
}

/// Evaluate with the default collaborators and the process environment.
pub async fn evaluate(suite: &EvaluateTestSuite, options: &EvaluateOptions) -> Result<EvaluationResult> {
	Evaluator::builder().build().evaluate(suite, options).await
}

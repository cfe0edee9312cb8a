use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};

use crate::providers::{ApiProvider, ProviderResponse, ProviderSpec};
use crate::scorer::as_text;
use crate::scorers::scorer_for;
use crate::types::{
	Assertion, CellResult, EvaluateOptions, EvaluationResult, PromptEntry, Score, TestCase, TestSuite,
};

/// Runs a prepared suite. Every provider specification in the suite is
/// already resolved.
#[async_trait]
pub trait EvaluationEngine: Send + Sync {
	async fn run(&self, suite: &TestSuite, options: &EvaluateOptions) -> Result<EvaluationResult>;
}

/// Evaluates every test × prompt × provider cell.
#[derive(Debug, Clone, Default)]
pub struct MatrixEngine;

impl MatrixEngine {
	pub fn new() -> Self {
		Self
	}
}

struct Cell {
	test_index: usize,
	test: TestCase,
	prompt: PromptEntry,
	provider: Arc<dyn ApiProvider>,
}

#[async_trait]
impl EvaluationEngine for MatrixEngine {
	async fn run(&self, suite: &TestSuite, options: &EvaluateOptions) -> Result<EvaluationResult> {
		let implicit = [TestCase::default()];
		let tests: &[TestCase] = if suite.tests.is_empty() { &implicit } else { &suite.tests };

		let mut cells = Vec::new();
		for (test_index, test) in tests.iter().enumerate() {
			let providers = match test.provider.as_ref().and_then(ProviderSpec::resolved) {
				Some(provider) => vec![provider.clone()],
				None => suite.providers.clone(),
			};
			for prompt in &suite.prompts {
				for provider in &providers {
					cells.push(Cell {
						test_index,
						test: test.clone(),
						prompt: prompt.clone(),
						provider: provider.clone(),
					});
				}
			}
		}

		tracing::info!(cells = cells.len(), "running evaluation");
		let results: Vec<CellResult> = stream::iter(cells)
			.map(run_cell)
			.buffered(options.max_concurrency.max(1))
			.collect()
			.await;

		Ok(EvaluationResult::new(results))
	}
}

async fn run_cell(cell: Cell) -> CellResult {
	let Cell { test_index, test, prompt, provider } = cell;
	let rendered_prompt = render(&prompt.raw, &test.vars);
	tracing::debug!(provider = provider.id(), test = test_index, "calling provider");
	let response = provider.call_api(&rendered_prompt).await;

	let mut scores = Vec::with_capacity(test.assert.len());
	if let ProviderResponse::Output { output, .. } = &response {
		let output = Value::String(output.clone());
		for assertion in &test.assert {
			scores.push(grade(assertion, &test.vars, &output).await);
		}
	}
	let success = !response.is_error() && scores.iter().all(|s| s.passed);

	CellResult {
		test_index,
		description: test.description,
		provider_id: provider.id().to_string(),
		prompt,
		rendered_prompt,
		vars: test.vars,
		response,
		scores,
		success,
	}
}

async fn grade(assertion: &Assertion, vars: &Map<String, Value>, output: &Value) -> Score {
	let expected = match &assertion.value {
		Some(Value::String(s)) => Value::String(render(s, vars)),
		Some(other) => other.clone(),
		None => Value::Null,
	};
	let result = match scorer_for(assertion) {
		Ok(scorer) => scorer.score(&expected, output).await,
		Err(err) => Err(err),
	};
	result.unwrap_or_else(|err| Score {
		name: assertion.kind.to_string(),
		value: 0.0,
		passed: false,
		details: Some(serde_json::json!({ "error": err.to_string() })),
	})
}

/// Substitute `{{ name }}` placeholders. Unknown names are left as written.
pub fn render(template: &str, vars: &Map<String, Value>) -> String {
	let mut out = String::with_capacity(template.len());
	let mut rest = template;
	while let Some(start) = rest.find("{{") {
		let Some(len) = rest[start..].find("}}") else {
			break;
		};
		let end = start + len + 2;
		out.push_str(&rest[..start]);
		match vars.get(rest[start + 2..end - 2].trim()) {
			Some(value) => out.push_str(&as_text(value)),
			None => out.push_str(&rest[start..end]),
		}
		rest = &rest[end..];
	}
	out.push_str(rest);
	out
}

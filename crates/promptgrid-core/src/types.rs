use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use promptgrid_types::{
	CellResult, EvaluationResult, EvaluationStats, PromptEntry, ProviderResponse, Score, TokenUsage,
};

use crate::providers::{ApiProvider, ProviderSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
	Equals,
	Contains,
	Icontains,
	Regex,
	IsJson,
	Similar,
	LlmRubric,
}

impl AssertionKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Equals => "equals",
			Self::Contains => "contains",
			Self::Icontains => "icontains",
			Self::Regex => "regex",
			Self::IsJson => "is-json",
			Self::Similar => "similar",
			Self::LlmRubric => "llm-rubric",
		}
	}
}

impl fmt::Display for AssertionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assertion {
	#[serde(rename = "type")]
	pub kind: AssertionKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub threshold: Option<f64>,
	/// Grader override, e.g. for `llm-rubric`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provider: Option<ProviderSpec>,
}

impl Assertion {
	pub fn new(kind: AssertionKind, value: impl Into<Value>) -> Self {
		Self { kind, value: Some(value.into()), threshold: None, provider: None }
	}

	pub fn with_provider(mut self, provider: impl Into<ProviderSpec>) -> Self {
		self.provider = Some(provider.into());
		self
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default)]
	pub vars: Map<String, Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provider: Option<ProviderSpec>,
	#[serde(default)]
	pub assert: Vec<Assertion>,
}

impl TestCase {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.vars.insert(name.into(), value.into());
		self
	}

	pub fn assertion(mut self, assertion: Assertion) -> Self {
		self.assert.push(assertion);
		self
	}

	/// Fill in the suite defaults: test vars win, default assertions run first.
	pub fn with_defaults(mut self, defaults: &TestCase) -> Self {
		let mut vars = defaults.vars.clone();
		vars.extend(std::mem::take(&mut self.vars));
		self.vars = vars;

		let mut assert = defaults.assert.clone();
		assert.append(&mut self.assert);
		self.assert = assert;

		if self.provider.is_none() {
			self.provider = defaults.provider.clone();
		}
		if self.description.is_none() {
			self.description = defaults.description.clone();
		}
		self
	}
}

/// Tests listed inline or stored in a file (`.jsonl`, `.json`, `.yaml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestSource {
	Path(PathBuf),
	Inline(Vec<TestCase>),
}

impl Default for TestSource {
	fn default() -> Self {
		Self::Inline(Vec::new())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputPath {
	Single(PathBuf),
	Multiple(Vec<PathBuf>),
}

impl OutputPath {
	pub fn paths(&self) -> Vec<&PathBuf> {
		match self {
			Self::Single(path) => vec![path],
			Self::Multiple(paths) => paths.iter().collect(),
		}
	}
}

/// The suite as the user wrote it. Never mutated by evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluateTestSuite {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub providers: Vec<ProviderSpec>,
	pub prompts: Vec<Value>,
	#[serde(default)]
	pub tests: TestSource,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_test: Option<TestCase>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub output_path: Option<OutputPath>,
	#[serde(default)]
	pub write_latest_results: bool,
}

/// The fully prepared suite handed to the evaluation engine.
#[derive(Clone)]
pub struct TestSuite {
	pub description: Option<String>,
	pub providers: Vec<Arc<dyn ApiProvider>>,
	pub prompts: Vec<PromptEntry>,
	pub tests: Vec<TestCase>,
}

impl fmt::Debug for TestSuite {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TestSuite")
			.field("description", &self.description)
			.field("providers", &self.providers.iter().map(|p| p.id()).collect::<Vec<_>>())
			.field("prompts", &self.prompts)
			.field("tests", &self.tests)
			.finish()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateOptions {
	/// `Some(false)` turns the response cache off for this run.
	#[serde(default)]
	pub cache: Option<bool>,
	#[serde(default = "default_max_concurrency")]
	pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
	4
}

impl Default for EvaluateOptions {
	fn default() -> Self {
		Self { cache: None, max_concurrency: default_max_concurrency() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn defaults_merge_under_test_values() {
		let defaults = TestCase::new()
			.var("lang", "en")
			.var("tone", "formal")
			.assertion(Assertion::new(AssertionKind::IsJson, Value::Null));
		let test = TestCase::new()
			.var("tone", "casual")
			.assertion(Assertion::new(AssertionKind::Contains, "hi"))
			.with_defaults(&defaults);

		assert_eq!(test.vars["lang"], json!("en"));
		assert_eq!(test.vars["tone"], json!("casual"));
		let kinds: Vec<_> = test.assert.iter().map(|a| a.kind).collect();
		assert_eq!(kinds, vec![AssertionKind::IsJson, AssertionKind::Contains]);
	}

	#[test]
	fn assertion_types_are_kebab_case() {
		let a: Assertion = serde_json::from_value(json!({
			"type": "llm-rubric",
			"value": "is polite",
			"provider": { "id": "openai:chat:gpt-4" }
		}))
		.unwrap();
		assert_eq!(a.kind, AssertionKind::LlmRubric);
		assert!(matches!(a.provider, Some(ProviderSpec::Options(_))));
		assert!(serde_json::from_value::<Assertion>(json!({ "type": "telepathy" })).is_err());
	}

	#[test]
	fn suite_accepts_tests_path_or_list() {
		let suite: EvaluateTestSuite = serde_json::from_value(json!({
			"providers": ["openai:chat:gpt-4"],
			"prompts": ["Say hi"],
			"tests": "tests.jsonl",
			"output_path": "out.json"
		}))
		.unwrap();
		assert!(matches!(suite.tests, TestSource::Path(_)));
		assert_eq!(suite.output_path.unwrap().paths().len(), 1);

		let suite: EvaluateTestSuite = serde_json::from_value(json!({
			"providers": [],
			"prompts": [],
			"tests": [{ "vars": { "name": "Ada" } }]
		}))
		.unwrap();
		match suite.tests {
			TestSource::Inline(tests) => assert_eq!(tests[0].vars["name"], json!("Ada")),
			other => panic!("unexpected tests {other:?}"),
		}
	}
}

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::scorer::{as_text, Scorer};
use crate::types::Score;

/// String equality, or JSON equality when the expected value is structured.
pub struct EqualsScorer;

#[async_trait]
impl Scorer for EqualsScorer {
	fn name(&self) -> &'static str {
		"equals"
	}

	async fn score(&self, expected: &Value, output: &Value) -> Result<Score> {
		let output = as_text(output);
		let passed = match expected {
			Value::String(s) => &output == s,
			other => serde_json::from_str::<Value>(&output).map(|v| &v == other).unwrap_or(false),
		};
		let value = if passed { 1.0 } else { 0.0 };
		Ok(Score {
			name: self.name().to_string(),
			value,
			passed,
			details: None,
		})
	}
}

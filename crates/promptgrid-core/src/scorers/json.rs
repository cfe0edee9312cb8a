use anyhow::Result;
use async_trait::async_trait;
use jsonschema::JSONSchema;
use serde_json::Value;

use crate::scorer::{as_text, Scorer};
use crate::types::Score;

/// Passes when the output parses as JSON and, when the assertion value is a
/// schema object, validates against it.
pub struct JsonScorer;

impl JsonScorer {
	fn fail(&self, details: Value) -> Score {
		Score {
			name: self.name().to_string(),
			value: 0.0,
			passed: false,
			details: Some(details),
		}
	}
}

#[async_trait]
impl Scorer for JsonScorer {
	fn name(&self) -> &'static str {
		"is-json"
	}

	async fn score(&self, expected: &Value, output: &Value) -> Result<Score> {
		let parsed: Value = match serde_json::from_str(&as_text(output)) {
			Ok(v) => v,
			Err(e) => {
				return Ok(self.fail(serde_json::json!({
					"valid": false,
					"message": format!("Output is not valid JSON: {}", e)
				})));
			}
		};

		if expected.is_object() {
			let schema = JSONSchema::compile(expected)
				.map_err(|e| anyhow::anyhow!("Invalid JSON schema: {}", e))?;
			let error_msgs: Vec<String> = match schema.validate(&parsed) {
				Ok(()) => Vec::new(),
				Err(errors) => errors
					.map(|e| format!("{}: {}", e.instance_path, e))
					.collect(),
			};
			if !error_msgs.is_empty() {
				return Ok(self.fail(serde_json::json!({
					"valid": false,
					"errors": error_msgs
				})));
			}
		}

		Ok(Score {
			name: self.name().to_string(),
			value: 1.0,
			passed: true,
			details: Some(serde_json::json!({ "valid": true })),
		})
	}
}

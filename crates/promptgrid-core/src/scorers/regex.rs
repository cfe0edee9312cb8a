use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use crate::scorer::{as_text, Scorer};
use crate::types::Score;

/// Checks if output matches the expected regex pattern.
pub struct RegexScorer;

#[async_trait]
impl Scorer for RegexScorer {
	fn name(&self) -> &'static str {
		"regex"
	}

	async fn score(&self, expected: &Value, output: &Value) -> Result<Score> {
		let pattern_str = as_text(expected);
		let pattern = Regex::new(&pattern_str)?;
		let output_str = as_text(output);

		let matches = pattern.is_match(&output_str);

		Ok(Score {
			name: self.name().to_string(),
			value: if matches { 1.0 } else { 0.0 },
			passed: matches,
			details: Some(serde_json::json!({
				"pattern": pattern_str,
				"matches": matches,
				"captures": if matches {
					pattern.captures(&output_str)
						.map(|caps| {
							caps.iter()
								.enumerate()
								.filter_map(|(i, m)| m.map(|m| (i, m.as_str().to_string())))
								.collect::<Vec<_>>()
						})
				} else {
					None
				}
			})),
		})
	}
}

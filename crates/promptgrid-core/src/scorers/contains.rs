use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::scorer::{as_text, Scorer};
use crate::types::Score;

/// Checks if output contains the expected substring.
pub struct ContainsScorer {
    case_sensitive: bool,
}

impl ContainsScorer {
    /// Creates a case-sensitive contains scorer.
    pub fn new() -> Self {
        Self { case_sensitive: true }
    }

    /// Creates a case-insensitive contains scorer.
    pub fn case_insensitive() -> Self {
        Self { case_sensitive: false }
    }
}

impl Default for ContainsScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scorer for ContainsScorer {
    fn name(&self) -> &'static str {
        if self.case_sensitive {
            "contains"
        } else {
            "icontains"
        }
    }

    async fn score(&self, expected: &Value, output: &Value) -> Result<Score> {
        if expected.is_null() {
            bail!("{} assertion requires a value", self.name());
        }
        let substring = as_text(expected);
        let output_str = as_text(output);

        let contains = if self.case_sensitive {
            output_str.contains(&substring)
        } else {
            output_str.to_lowercase().contains(&substring.to_lowercase())
        };

        Ok(Score {
            name: self.name().to_string(),
            value: if contains { 1.0 } else { 0.0 },
            passed: contains,
            details: Some(serde_json::json!({
                "substring": substring,
                "case_sensitive": self.case_sensitive,
                "found": contains
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_contains_found() {
        let scorer = ContainsScorer::new();
        let score = scorer
            .score(&json!("Paris"), &json!("The capital of France is Paris"))
            .await
            .unwrap();
        assert!(score.passed);
        assert_eq!(score.value, 1.0);
    }

    #[tokio::test]
    async fn test_contains_case_sensitive_fail() {
        let scorer = ContainsScorer::new();
        let score = scorer
            .score(&json!("PARIS"), &json!("The capital of France is Paris"))
            .await
            .unwrap();
        assert!(!score.passed);
        assert_eq!(score.value, 0.0);
    }

    #[tokio::test]
    async fn test_contains_case_insensitive() {
        let scorer = ContainsScorer::case_insensitive();
        let score = scorer
            .score(&json!("PARIS"), &json!("The capital of France is paris"))
            .await
            .unwrap();
        assert!(score.passed);
        assert_eq!(score.name, "icontains");
    }

    #[tokio::test]
    async fn test_contains_requires_value() {
        let err = ContainsScorer::new().score(&Value::Null, &json!("x")).await.unwrap_err();
        assert!(err.to_string().contains("requires a value"));
    }
}

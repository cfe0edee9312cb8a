use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use strsim::levenshtein;

use crate::scorer::{as_text, Scorer};
use crate::types::Score;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.75;

pub struct LevenshteinScorer {
    pub min_similarity: f64,
}

impl LevenshteinScorer {
    pub fn new(min_similarity: f64) -> Self {
        Self { min_similarity }
    }
}

#[async_trait]
impl Scorer for LevenshteinScorer {
    fn name(&self) -> &'static str {
        "similar"
    }

    async fn score(&self, expected: &Value, output: &Value) -> Result<Score> {
        let e = as_text(expected);
        let o = as_text(output);
        let max_len = e.chars().count().max(o.chars().count()).max(1) as f64;
        let similarity = 1.0 - (levenshtein(&e, &o) as f64 / max_len);
        let passed = similarity >= self.min_similarity;
        Ok(Score {
            name: self.name().to_string(),
            value: similarity,
            passed,
            details: Some(serde_json::json!({ "threshold": self.min_similarity })),
        })
    }
}

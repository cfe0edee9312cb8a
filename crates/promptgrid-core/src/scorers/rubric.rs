use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::providers::{ApiProvider, ProviderResponse};
use crate::scorer::{as_text, Scorer};
use crate::types::Score;

const GRADING_PROMPT: &str = "You are grading output according to a user-specified rubric. \
If the statement in the rubric is true, then the output passes the test. \
You respond with a JSON object with this structure: {\"pass\": boolean, \"reason\": string}.\n\n\
Rubric: {{rubric}}\n\nOutput: {{output}}";

#[derive(Debug, Deserialize)]
struct Verdict {
    pass: bool,
    #[serde(default)]
    reason: String,
}

/// Asks a grader model whether the output satisfies a natural-language rubric.
pub struct RubricScorer {
    grader: Option<Arc<dyn ApiProvider>>,
}

impl RubricScorer {
    pub fn new(grader: Option<Arc<dyn ApiProvider>>) -> Self {
        Self { grader }
    }

    fn grading_prompt(rubric: &str, output: &str) -> String {
        GRADING_PROMPT
            .replace("{{rubric}}", rubric)
            .replace("{{output}}", output)
    }
}

#[async_trait]
impl Scorer for RubricScorer {
    fn name(&self) -> &'static str {
        "llm-rubric"
    }

    async fn score(&self, expected: &Value, output: &Value) -> Result<Score> {
        let Some(grader) = &self.grader else {
            bail!("llm-rubric assertion has no grading provider");
        };
        let prompt = Self::grading_prompt(&as_text(expected), &as_text(output));
        tracing::debug!(grader = grader.id(), "grading with rubric");

        let text = match grader.call_api(&prompt).await {
            ProviderResponse::Output { output, .. } => output,
            ProviderResponse::Error { error } => bail!("grader error: {}", error),
        };
        let verdict: Verdict = serde_json::from_str(text.trim())
            .map_err(|e| anyhow!("grader returned invalid verdict: {}: {}", e, text))?;

        Ok(Score {
            name: self.name().to_string(),
            value: if verdict.pass { 1.0 } else { 0.0 },
            passed: verdict.pass,
            details: Some(serde_json::json!({
                "grader": grader.id(),
                "reason": verdict.reason
            })),
        })
    }
}

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::types::Score;

#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn score(&self, expected: &Value, output: &Value) -> Result<Score>;
}

/// Text form of a value: strings verbatim, `null` empty, everything else as JSON.
pub(crate) fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        _ => v.to_string(),
    }
}

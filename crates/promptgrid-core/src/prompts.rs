use serde_json::Value;

use crate::types::PromptEntry;

/// Reduce the suite's prompts to canonical entries.
///
/// A list made only of objects is one conversation and becomes a single
/// entry. Otherwise strings pass through and anything else is serialized.
pub fn normalize_prompts(prompts: &[Value]) -> Vec<PromptEntry> {
    if !prompts.is_empty() && prompts.iter().all(Value::is_object) {
        return vec![PromptEntry::new(Value::from(prompts.to_vec()).to_string())];
    }

    prompts
        .iter()
        .map(|prompt| match prompt {
            Value::String(s) => PromptEntry::new(s.clone()),
            other => PromptEntry::new(other.to_string()),
        })
        .collect()
}

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::types::{EvaluateTestSuite, TestSource};

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_OPENAI_API_HOST: &str = "api.openai.com";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_TEMPERATURE: f64 = 0.0;

/// Environment-sourced provider settings, captured once per loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderEnv {
    pub openai_api_key: Option<String>,
    pub openai_api_host: Option<String>,
    pub openai_max_tokens: Option<u32>,
    pub openai_temperature: Option<f64>,
    pub request_timeout_ms: Option<u64>,
}

impl ProviderEnv {
    pub fn from_process() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            openai_api_host: get("OPENAI_API_HOST"),
            openai_max_tokens: get("OPENAI_MAX_TOKENS").and_then(|v| parse_or_warn("OPENAI_MAX_TOKENS", &v)),
            openai_temperature: get("OPENAI_TEMPERATURE").and_then(|v| parse_or_warn("OPENAI_TEMPERATURE", &v)),
            request_timeout_ms: get("REQUEST_TIMEOUT_MS").and_then(|v| parse_or_warn("REQUEST_TIMEOUT_MS", &v)),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.openai_api_key = Some(key.into());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS))
    }
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(key, value, "ignoring unparseable environment value, using default");
            None
        }
    }
}

/// Read a suite file (YAML or JSON). A relative `tests` path is resolved
/// against the suite file's directory.
pub async fn load_suite(path: impl AsRef<Path>) -> Result<EvaluateTestSuite> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    let mut suite: EvaluateTestSuite = match extension(path).as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {:?}", path))?,
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {:?}", path))?,
        _ => bail!("Unsupported suite file {:?}: expected .yaml, .yml or .json", path),
    };

    if let TestSource::Path(tests) = &mut suite.tests {
        if tests.is_relative() {
            if let Some(dir) = path.parent() {
                *tests = dir.join(&*tests);
            }
        }
    }

    Ok(suite)
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_known_variables() {
        let env = ProviderEnv::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_API_HOST", "proxy.local"),
            ("OPENAI_MAX_TOKENS", "256"),
            ("OPENAI_TEMPERATURE", "0.7"),
            ("REQUEST_TIMEOUT_MS", "500"),
        ]));
        assert_eq!(env.openai_api_key.as_deref(), Some("sk-test"));
        assert_eq!(env.openai_api_host.as_deref(), Some("proxy.local"));
        assert_eq!(env.openai_max_tokens, Some(256));
        assert_eq!(env.openai_temperature, Some(0.7));
        assert_eq!(env.request_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn bad_numbers_and_empty_values_fall_back() {
        let env = ProviderEnv::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "  "),
            ("OPENAI_MAX_TOKENS", "lots"),
            ("REQUEST_TIMEOUT_MS", "-1"),
        ]));
        assert!(env.openai_api_key.is_none());
        assert!(env.openai_max_tokens.is_none());
        assert_eq!(env.request_timeout(), Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));
    }

    #[tokio::test]
    async fn loads_yaml_suite_and_anchors_tests_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yaml");
        tokio::fs::write(
            &path,
            r#"
description: greeting
providers:
  - openai:chat:gpt-4
  - id: openai:completion
    config:
      temperature: 0.2
prompts:
  - "Say hi to {{ name }}"
tests: tests.jsonl
output_path:
  - out.json
  - out.yaml
write_latest_results: true
"#,
        )
        .await
        .unwrap();

        let suite = load_suite(&path).await.unwrap();
        assert_eq!(suite.providers.len(), 2);
        assert_eq!(suite.prompts.len(), 1);
        assert!(suite.write_latest_results);
        match &suite.tests {
            TestSource::Path(p) => assert_eq!(p, &dir.path().join("tests.jsonl")),
            other => panic!("unexpected tests {other:?}"),
        }
        assert_eq!(suite.output_path.unwrap().paths().len(), 2);
    }

    #[tokio::test]
    async fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.toml");
        tokio::fs::write(&path, "providers = []").await.unwrap();
        assert!(load_suite(&path).await.is_err());
    }
}

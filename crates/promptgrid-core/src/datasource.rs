use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;

use crate::config::extension;
use crate::types::{TestCase, TestSource};

#[async_trait]
pub trait TestLoader: Send + Sync {
    /// Load the suite's tests and merge `defaults` into each one.
    async fn load(&self, source: &TestSource, defaults: Option<&TestCase>) -> Result<Vec<TestCase>>;
}

/// Reads inline tests or test files.
///
/// File formats by extension:
/// - `.jsonl`: one test object per line
/// - `.json`: an array of tests
/// - `.yaml` / `.yml`: a list of tests
#[derive(Debug, Default, Clone)]
pub struct FileTestLoader {
    base_dir: Option<PathBuf>,
}

impl FileTestLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl TestLoader for FileTestLoader {
    async fn load(&self, source: &TestSource, defaults: Option<&TestCase>) -> Result<Vec<TestCase>> {
        let tests = match source {
            TestSource::Inline(tests) => tests.clone(),
            TestSource::Path(path) => read_tests(&self.resolve(path)).await?,
        };

        Ok(match defaults {
            Some(defaults) => tests.into_iter().map(|t| t.with_defaults(defaults)).collect(),
            None => tests,
        })
    }
}

async fn read_tests(path: &Path) -> Result<Vec<TestCase>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;

    match extension(path).as_deref() {
        Some("jsonl") => parse_jsonl(&content),
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid test list in {:?}", path)),
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid test list in {:?}", path)),
        _ => bail!("Unsupported test file {:?}: expected .jsonl, .json, .yaml or .yml", path),
    }
}

fn parse_jsonl(content: &str) -> Result<Vec<TestCase>> {
    let mut tests = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let test: TestCase = serde_json::from_str(line)
            .map_err(|e| anyhow!("Line {}: invalid test case: {}", idx + 1, e))?;
        tests.push(test);
    }
    Ok(tests)
}

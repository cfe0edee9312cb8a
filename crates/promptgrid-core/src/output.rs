//! Where evaluation results go after a run.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::config::extension;
use crate::types::{EvaluationResult, PromptEntry, TestSuite};

pub const DEFAULT_LATEST_DIR: &str = ".promptgrid";

#[async_trait]
pub trait OutputWriter: Send + Sync {
    async fn write(&self, path: &Path, result: &EvaluationResult, suite: &TestSuite) -> Result<()>;
}

#[async_trait]
pub trait LatestResultsWriter: Send + Sync {
    async fn write_latest(&self, result: &EvaluationResult, suite: &TestSuite) -> Result<()>;
}

#[derive(Serialize)]
struct SuiteSummary<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    providers: Vec<&'a str>,
    prompts: &'a [PromptEntry],
}

#[derive(Serialize)]
struct OutputFile<'a> {
    suite: SuiteSummary<'a>,
    #[serde(flatten)]
    result: &'a EvaluationResult,
}

impl<'a> OutputFile<'a> {
    fn new(result: &'a EvaluationResult, suite: &'a TestSuite) -> Self {
        Self {
            suite: SuiteSummary {
                description: suite.description.as_deref(),
                providers: suite.providers.iter().map(|p| p.id()).collect(),
                prompts: &suite.prompts,
            },
            result,
        }
    }
}

/// Writes `.json`, `.yaml`/`.yml` or `.txt` (summary table), chosen by extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOutputWriter;

#[async_trait]
impl OutputWriter for FileOutputWriter {
    async fn write(&self, path: &Path, result: &EvaluationResult, suite: &TestSuite) -> Result<()> {
        let file = OutputFile::new(result, suite);
        let content = match extension(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(&file)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(&file)?,
            Some("txt") => result.summary_table(),
            _ => bail!("Unsupported output file {:?}: expected .json, .yaml, .yml or .txt", path),
        };
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        tracing::info!(path = %path.display(), "wrote evaluation output");
        Ok(())
    }
}

/// Keeps the most recent run in `<dir>/latest.json`.
#[derive(Debug, Clone)]
pub struct JsonLatestResults {
    dir: PathBuf,
}

impl JsonLatestResults {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("latest.json")
    }
}

impl Default for JsonLatestResults {
    fn default() -> Self {
        Self::new(DEFAULT_LATEST_DIR)
    }
}

#[async_trait]
impl LatestResultsWriter for JsonLatestResults {
    async fn write_latest(&self, result: &EvaluationResult, suite: &TestSuite) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {:?}", self.dir))?;
        let content = serde_json::to_string_pretty(&OutputFile::new(result, suite))?;
        let path = self.path();
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }
}

/// Appends each run to a SQLite history.
#[cfg(feature = "persistence")]
#[derive(Clone)]
pub struct SqliteLatestResults {
    store: promptgrid_store::Store,
}

#[cfg(feature = "persistence")]
impl SqliteLatestResults {
    pub fn new(store: promptgrid_store::Store) -> Self {
        Self { store }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(promptgrid_store::Store::open(path)?))
    }
}

#[cfg(feature = "persistence")]
#[async_trait]
impl LatestResultsWriter for SqliteLatestResults {
    async fn write_latest(&self, result: &EvaluationResult, suite: &TestSuite) -> Result<()> {
        let store = self.store.clone();
        let result = result.clone();
        let description = suite.description.clone();
        let id = tokio::task::spawn_blocking(move || store.save_run(description.as_deref(), &result))
            .await
            .context("SQLite writer task failed")??;
        tracing::debug!(run = id, "stored evaluation run");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellResult, ProviderResponse, TokenUsage};
    use serde_json::Map;

    fn fixture() -> (EvaluationResult, TestSuite) {
        let cell = CellResult {
            test_index: 0,
            description: Some("greets".into()),
            provider_id: "openai:gpt-4".into(),
            prompt: PromptEntry::new("Say hi"),
            rendered_prompt: "Say hi".into(),
            vars: Map::new(),
            response: ProviderResponse::output("hi", TokenUsage::new(2, 1, 1)),
            scores: Vec::new(),
            success: true,
        };
        let suite = TestSuite {
            description: Some("smoke".into()),
            providers: Vec::new(),
            prompts: vec![PromptEntry::new("Say hi")],
            tests: Vec::new(),
        };
        (EvaluationResult::new(vec![cell]), suite)
    }

    #[tokio::test]
    async fn writes_each_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (result, suite) = fixture();

        for name in ["out.json", "out.yaml", "out.txt"] {
            FileOutputWriter.write(&dir.path().join(name), &result, &suite).await.unwrap();
        }

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("out.json")).unwrap()).unwrap();
        assert_eq!(json["suite"]["description"], "smoke");
        assert_eq!(json["stats"]["successes"], 1);
        assert_eq!(json["results"][0]["response"]["output"], "hi");

        let yaml = std::fs::read_to_string(dir.path().join("out.yaml")).unwrap();
        assert!(yaml.contains("provider_id:") && yaml.contains("openai:gpt-4"));

        let txt = std::fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert!(txt.contains("Pass rate: 100.0%"));
    }

    #[tokio::test]
    async fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (result, suite) = fixture();
        let err = FileOutputWriter
            .write(&dir.path().join("out.csv"), &result, &suite)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported output file"));
    }

    #[tokio::test]
    async fn latest_results_land_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (result, suite) = fixture();
        let writer = JsonLatestResults::new(dir.path().join("state"));
        writer.write_latest(&result, &suite).await.unwrap();
        assert!(writer.path().exists());
    }

    #[cfg(feature = "persistence")]
    #[tokio::test]
    async fn sqlite_writer_records_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = promptgrid_store::Store::open(dir.path().join("runs.db")).unwrap();
        let (result, suite) = fixture();
        SqliteLatestResults::new(store.clone()).write_latest(&result, &suite).await.unwrap();
        let run = store.latest_run().unwrap().unwrap();
        assert_eq!(run.description.as_deref(), Some("smoke"));
        assert_eq!(run.result.stats.successes, 1);
    }
}

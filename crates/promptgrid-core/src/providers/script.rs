use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{ApiProvider, ProviderResponse, TokenUsage};

/// Custom provider backed by an executable on disk.
///
/// The prompt is written to the script's stdin. Stdout is read as a JSON
/// `{"output": ...}` / `{"error": ...}` object when it parses as one, and as
/// plain output text otherwise. A non-zero exit status is an error response.
pub struct ScriptProvider {
    id: String,
    path: PathBuf,
    timeout: Duration,
}

impl ScriptProvider {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn run(&self, prompt: &str) -> Result<std::process::Output, String> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to start provider script {:?}: {}", self.path, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_string();
            // stdin is fed while stdout is drained
            tokio::spawn(async move {
                let _ = stdin.write_all(prompt.as_bytes()).await;
            });
        }

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(format!("Provider script {:?} failed: {}", self.path, e)),
            Err(_) => Err(format!(
                "Provider script {:?} timed out after {}ms",
                self.path,
                self.timeout.as_millis()
            )),
        }
    }
}

#[async_trait]
impl ApiProvider for ScriptProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call_api(&self, prompt: &str) -> ProviderResponse {
        let output = match self.run(prompt).await {
            Ok(output) => output,
            Err(message) => return ProviderResponse::error(message),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return ProviderResponse::error(format!(
                "Provider script exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<ProviderResponse>(stdout.trim())
            .unwrap_or_else(|_| ProviderResponse::output(stdout.trim(), TokenUsage::default()))
    }
}

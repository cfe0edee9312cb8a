use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabled::Tabled;

/// Token counts reported by a provider for a single call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
	#[serde(default)]
	pub total: u64,
	#[serde(default)]
	pub prompt: u64,
	#[serde(default)]
	pub completion: u64,
}

impl TokenUsage {
	pub fn new(total: u64, prompt: u64, completion: u64) -> Self {
		Self { total, prompt, completion }
	}

	pub fn add(&mut self, other: &TokenUsage) {
		self.total += other.total;
		self.prompt += other.prompt;
		self.completion += other.completion;
	}
}

/// Outcome of one provider call. Exactly one of output or error is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderResponse {
	Output {
		output: String,
		#[serde(default)]
		token_usage: TokenUsage,
	},
	Error {
		error: String,
	},
}

impl ProviderResponse {
	pub fn output(output: impl Into<String>, token_usage: TokenUsage) -> Self {
		Self::Output { output: output.into(), token_usage }
	}

	pub fn error(error: impl Into<String>) -> Self {
		Self::Error { error: error.into() }
	}

	pub fn is_error(&self) -> bool {
		matches!(self, Self::Error { .. })
	}

	pub fn output_text(&self) -> Option<&str> {
		match self {
			Self::Output { output, .. } => Some(output),
			Self::Error { .. } => None,
		}
	}

	pub fn error_text(&self) -> Option<&str> {
		match self {
			Self::Output { .. } => None,
			Self::Error { error } => Some(error),
		}
	}

	pub fn token_usage(&self) -> Option<&TokenUsage> {
		match self {
			Self::Output { token_usage, .. } => Some(token_usage),
			Self::Error { .. } => None,
		}
	}
}

/// Canonical prompt form. `raw` goes to the provider, `display` goes to reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
	pub raw: String,
	pub display: String,
}

impl PromptEntry {
	pub fn new(raw: impl Into<String>) -> Self {
		let raw = raw.into();
		Self { display: raw.clone(), raw }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Score {
	pub name: String,
	pub value: f64,
	pub passed: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// One cell of the evaluation matrix: a test, a prompt and a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellResult {
	pub test_index: usize,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub provider_id: String,
	pub prompt: PromptEntry,
	pub rendered_prompt: String,
	#[serde(default)]
	pub vars: Map<String, Value>,
	pub response: ProviderResponse,
	#[serde(default)]
	pub scores: Vec<Score>,
	pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationStats {
	pub successes: usize,
	pub failures: usize,
	pub token_usage: TokenUsage,
}

impl EvaluationStats {
	pub fn total(&self) -> usize {
		self.successes + self.failures
	}

	pub fn pass_rate(&self) -> f64 {
		let total = self.total();
		if total == 0 { 0.0 } else { self.successes as f64 / total as f64 }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
	pub version: u32,
	pub results: Vec<CellResult>,
	pub stats: EvaluationStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct SummaryRow {
	test: String,
	provider: String,
	passed: String,
	prompt: String,
	output: String,
}

impl EvaluationResult {
	pub const VERSION: u32 = 1;

	pub fn new(results: Vec<CellResult>) -> Self {
		let stats = Self::summarize(&results);
		Self { version: Self::VERSION, results, stats }
	}

	pub fn summarize(cells: &[CellResult]) -> EvaluationStats {
		let mut stats = EvaluationStats::default();
		for cell in cells {
			if cell.success {
				stats.successes += 1;
			} else {
				stats.failures += 1;
			}
			if let Some(usage) = cell.response.token_usage() {
				stats.token_usage.add(usage);
			}
		}
		stats
	}

	pub fn summary_table(&self) -> String {
		use tabled::Table;
		let rows: Vec<SummaryRow> = self.results.iter().map(|cell| {
			let test = cell
				.description
				.clone()
				.unwrap_or_else(|| format!("#{}", cell.test_index + 1));
			let output = match &cell.response {
				ProviderResponse::Output { output, .. } => output.clone(),
				ProviderResponse::Error { error } => format!("[error] {error}"),
			};

			SummaryRow {
				test,
				provider: cell.provider_id.clone(),
				passed: if cell.success { "✓".to_string() } else { " ".to_string() },
				prompt: truncate(cell.prompt.display.clone(), 48),
				output: truncate(output, 64),
			}
		}).collect();

		let table = Table::new(rows);

		let summary_text = format!(
			"Successes: {}  Failures: {}  Pass rate: {:.1}%  Tokens: {} ({} prompt / {} completion)",
			self.stats.successes,
			self.stats.failures,
			self.stats.pass_rate() * 100.0,
			self.stats.token_usage.total,
			self.stats.token_usage.prompt,
			self.stats.token_usage.completion,
		);

		format!("{}\n\n{}\n", table, summary_text)
	}
}

fn truncate(s: String, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		return s;
	}
	let mut truncated = s.chars().take(max_len.saturating_sub(1)).collect::<String>();
	truncated.push('…');
	truncated
}

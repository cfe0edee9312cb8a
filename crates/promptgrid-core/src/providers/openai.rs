//! OpenAI completion and chat adapters.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use super::{ApiProvider, ProviderConfig, ProviderResponse, TokenUsage};
use crate::cache::ResponseCache;
use crate::config::{
    ProviderEnv, DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_API_HOST, DEFAULT_REQUEST_TIMEOUT_MS,
    DEFAULT_TEMPERATURE,
};
use crate::error::LoadError;

pub const COMPLETION_MODELS: &[&str] = &[
    "text-davinci-003",
    "text-davinci-002",
    "text-curie-001",
    "text-babbage-001",
    "text-ada-001",
];

pub const CHAT_MODELS: &[&str] = &[
    "gpt-4",
    "gpt-4-0314",
    "gpt-4-32k",
    "gpt-4-32k-0314",
    "gpt-3.5-turbo",
    "gpt-3.5-turbo-0301",
];

pub const DEFAULT_COMPLETION_MODEL: &str = "text-davinci-003";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

const COMPLETION_STOP: &[&str] = &["<|im_end|>", "<|endoftext|>"];

/// Connection and sampling settings for one OpenAI adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiSettings {
    api_key: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout: Duration,
}

impl OpenAiSettings {
    /// Merge provider config over the environment over built-in defaults.
    /// Fails when no API key is available from either source.
    pub fn resolve(env: &ProviderEnv, config: &ProviderConfig) -> Result<Self, LoadError> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| env.openai_api_key.clone())
            .ok_or(LoadError::MissingApiKey)?;

        let host = config
            .api_host
            .as_deref()
            .or(env.openai_api_host.as_deref())
            .unwrap_or(DEFAULT_OPENAI_API_HOST);

        Ok(Self {
            api_key,
            base_url: base_url(host),
            max_tokens: config
                .max_tokens
                .or(env.openai_max_tokens)
                .unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config
                .temperature
                .or(env.openai_temperature)
                .unwrap_or(DEFAULT_TEMPERATURE),
            timeout: Duration::from_millis(
                config
                    .timeout_ms
                    .or(env.request_timeout_ms)
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            ),
        })
    }
}

/// `api.openai.com` becomes `https://api.openai.com`; explicit schemes are kept.
fn base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn key_fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(&digest[..8])
}

/// HTTP plumbing shared by both adapter families.
struct OpenAiClient {
    id: String,
    model: String,
    /// Host and credential fingerprint; keeps adapters sharing a cache apart.
    cache_scope: String,
    settings: OpenAiSettings,
    http: Client,
    cache: Arc<ResponseCache>,
}

impl OpenAiClient {
    fn new(
        model: &str,
        known_models: &[&str],
        family: &str,
        settings: OpenAiSettings,
        cache: Arc<ResponseCache>,
    ) -> Result<Self, LoadError> {
        if !known_models.contains(&model) {
            tracing::warn!(model, "using unknown OpenAI {} model", family);
        }
        let http = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self {
            id: format!("openai:{model}"),
            model: model.to_string(),
            cache_scope: format!("{}#{}", settings.base_url, key_fingerprint(&settings.api_key)),
            settings,
            http,
            cache,
        })
    }

    async fn call<F>(&self, endpoint: &str, body: Value, parse: F) -> ProviderResponse
    where
        F: Fn(&str) -> Result<ProviderResponse>,
    {
        let cache_key = format!("{}:{}{}:{}", self.id, self.cache_scope, endpoint, body);
        if let Some(hit) = self.cache.get(&cache_key) {
            tracing::debug!(provider = %self.id, "serving response from cache");
            return hit;
        }

        let url = format!("{}{}", self.settings.base_url, endpoint);
        tracing::debug!(provider = %self.id, %url, "calling OpenAI API");

        let text = match self.send(&url, &body).await {
            Ok(text) => text,
            Err(err) => return ProviderResponse::error(format!("API call error: {err}")),
        };

        let response = match parse(&text) {
            Ok(response) => response,
            Err(err) => ProviderResponse::error(format!("API response error: {err}: {text}")),
        };
        self.cache.insert(cache_key, &response);
        response
    }

    async fn send(&self, url: &str, body: &Value) -> reqwest::Result<String> {
        self.http
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(body)
            .send()
            .await?
            .text()
            .await
    }
}

#[derive(Deserialize)]
struct UsageBody {
    total_tokens: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl From<UsageBody> for TokenUsage {
    fn from(usage: UsageBody) -> Self {
        TokenUsage::new(usage.total_tokens, usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Deserialize)]
struct CompletionBody {
    choices: Vec<CompletionChoice>,
    usage: UsageBody,
}

#[derive(Deserialize)]
struct CompletionChoice {
    text: String,
}

#[derive(Deserialize)]
struct ChatBody {
    choices: Vec<ChatChoice>,
    usage: UsageBody,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

fn parse_completion(text: &str) -> Result<ProviderResponse> {
    let body: CompletionBody = serde_json::from_str(text)?;
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("response contained no choices"))?;
    Ok(ProviderResponse::output(choice.text, body.usage.into()))
}

fn parse_chat(text: &str) -> Result<ProviderResponse> {
    let body: ChatBody = serde_json::from_str(text)?;
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("response contained no choices"))?;
    Ok(ProviderResponse::output(choice.message.content, body.usage.into()))
}

pub struct OpenAiCompletionProvider {
    client: OpenAiClient,
}

impl OpenAiCompletionProvider {
    pub fn new(
        model: &str,
        settings: OpenAiSettings,
        cache: Arc<ResponseCache>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            client: OpenAiClient::new(model, COMPLETION_MODELS, "completion", settings, cache)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.client.model
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.client.model,
            "prompt": prompt,
            "max_tokens": self.client.settings.max_tokens,
            "temperature": self.client.settings.temperature,
            "stop": COMPLETION_STOP,
        })
    }
}

#[async_trait]
impl ApiProvider for OpenAiCompletionProvider {
    fn id(&self) -> &str {
        &self.client.id
    }

    async fn call_api(&self, prompt: &str) -> ProviderResponse {
        let body = self.request_body(prompt);
        self.client.call("/v1/completions", body, parse_completion).await
    }
}

/// One conversational turn. Extra fields such as `name` are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// Structured turns when the prompt is a JSON turn list, otherwise the whole
/// prompt as a single user turn. Plain text is the common case, so the
/// fallback is silent.
pub fn parse_chat_prompt(prompt: &str) -> Vec<ChatMessage> {
    serde_json::from_str::<Vec<ChatMessage>>(prompt)
        .unwrap_or_else(|_| vec![ChatMessage::user(prompt)])
}

pub struct OpenAiChatProvider {
    client: OpenAiClient,
}

impl OpenAiChatProvider {
    pub fn new(
        model: &str,
        settings: OpenAiSettings,
        cache: Arc<ResponseCache>,
    ) -> Result<Self, LoadError> {
        Ok(Self {
            client: OpenAiClient::new(model, CHAT_MODELS, "chat", settings, cache)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.client.model
    }

    pub fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.client.model,
            "messages": parse_chat_prompt(prompt),
            "max_tokens": self.client.settings.max_tokens,
            "temperature": self.client.settings.temperature,
        })
    }
}

#[async_trait]
impl ApiProvider for OpenAiChatProvider {
    fn id(&self) -> &str {
        &self.client.id
    }

    async fn call_api(&self, prompt: &str) -> ProviderResponse {
        let body = self.request_body(prompt);
        self.client.call("/v1/chat/completions", body, parse_chat).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(host: &str) -> OpenAiSettings {
        let env = ProviderEnv::default().with_api_key("sk-test");
        let config = ProviderConfig {
            api_host: Some(host.to_string()),
            ..ProviderConfig::default()
        };
        OpenAiSettings::resolve(&env, &config).unwrap()
    }

    fn chat(host: &str) -> OpenAiChatProvider {
        OpenAiChatProvider::new("gpt-4", settings(host), Arc::new(ResponseCache::new())).unwrap()
    }

    #[test]
    fn missing_key_fails_before_any_request() {
        let err = OpenAiSettings::resolve(&ProviderEnv::default(), &ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingApiKey));
    }

    #[test]
    fn settings_layer_config_over_env_over_defaults() {
        let env = ProviderEnv {
            openai_api_key: Some("env-key".into()),
            openai_max_tokens: Some(64),
            openai_temperature: Some(0.9),
            ..ProviderEnv::default()
        };
        let config = ProviderConfig {
            temperature: Some(0.1),
            ..ProviderConfig::default()
        };
        let settings = OpenAiSettings::resolve(&env, &config).unwrap();
        assert_eq!(settings.base_url, "https://api.openai.com");
        assert_eq!(settings.max_tokens, 64);
        assert_eq!(settings.temperature, 0.1);
        assert_eq!(settings.timeout, Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS));

        let defaults = OpenAiSettings::resolve(&ProviderEnv::default().with_api_key("k"), &ProviderConfig::default()).unwrap();
        assert_eq!(defaults.max_tokens, 1024);
        assert_eq!(defaults.temperature, 0.0);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn logs_of(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn unknown_models_are_accepted_with_one_warning() {
        let cache = Arc::new(ResponseCache::new());
        let logs = logs_of(|| {
            let provider = OpenAiChatProvider::new("gpt-17", settings("localhost"), cache.clone()).unwrap();
            assert_eq!(provider.id(), "openai:gpt-17");
        });
        assert_eq!(logs.matches("WARN").count(), 1, "{logs}");
        assert!(logs.contains("gpt-17"));

        let logs = logs_of(|| {
            let provider =
                OpenAiCompletionProvider::new("text-davinci-999", settings("localhost"), cache.clone()).unwrap();
            assert_eq!(provider.id(), "openai:text-davinci-999");
        });
        assert_eq!(logs.matches("WARN").count(), 1, "{logs}");
    }

    #[test]
    fn known_models_construct_quietly() {
        let logs = logs_of(|| {
            chat("localhost");
        });
        assert_eq!(logs.matches("WARN").count(), 0, "{logs}");
    }

    #[test]
    fn chat_prompt_fallback_logs_nothing() {
        let logs = logs_of(|| {
            let turns = parse_chat_prompt("plain text");
            assert_eq!(turns.len(), 1);
        });
        assert!(logs.is_empty(), "{logs}");
    }

    #[test]
    fn chat_body_uses_parsed_turns() {
        let provider = chat("localhost");
        let prompt = r#"[{"role":"system","content":"be brief"},{"role":"user","content":"hi","name":"bob"}]"#;
        let body = provider.request_body(prompt);
        let expected: Value = serde_json::from_str(prompt).unwrap();
        assert_eq!(body["messages"], expected);
    }

    #[test]
    fn chat_body_falls_back_to_single_user_turn() {
        let provider = chat("localhost");
        let body = provider.request_body("Tell me a joke about [brackets]");
        assert_eq!(
            body["messages"],
            json!([{ "role": "user", "content": "Tell me a joke about [brackets]" }])
        );
    }

    #[test]
    fn completion_body_carries_sampling_settings() {
        let provider = OpenAiCompletionProvider::new(
            "text-davinci-003",
            settings("localhost"),
            Arc::new(ResponseCache::new()),
        )
        .unwrap();
        let body = provider.request_body("Say hi");
        assert_eq!(body["model"], json!("text-davinci-003"));
        assert_eq!(body["prompt"], json!("Say hi"));
        assert_eq!(body["max_tokens"], json!(1024));
        assert_eq!(body["temperature"], json!(0.0));

        let config = ProviderConfig {
            temperature: Some(0.7),
            ..ProviderConfig::default()
        };
        let settings = OpenAiSettings::resolve(&ProviderEnv::default().with_api_key("k"), &config).unwrap();
        let provider =
            OpenAiCompletionProvider::new("text-davinci-003", settings, Arc::new(ResponseCache::new())).unwrap();
        let body = provider.request_body("Say hi");
        assert_eq!(body["temperature"], json!(0.7));
    }

    #[tokio::test]
    async fn chat_call_returns_output_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-4" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hi!" } }],
                "usage": { "total_tokens": 12, "prompt_tokens": 9, "completion_tokens": 3 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = chat(&server.uri()).call_api("Say hi").await;
        assert_eq!(response, ProviderResponse::output("Hi!", TokenUsage::new(12, 9, 3)));
    }

    #[tokio::test]
    async fn completion_call_reads_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "text": "Hello there" }],
                "usage": { "total_tokens": 5, "prompt_tokens": 2, "completion_tokens": 3 }
            })))
            .mount(&server)
            .await;

        let provider = OpenAiCompletionProvider::new(
            "text-davinci-003",
            settings(&server.uri()),
            Arc::new(ResponseCache::new()),
        )
        .unwrap();
        let response = provider.call_api("Say hi").await;
        assert_eq!(response.output_text(), Some("Hello there"));
    }

    #[tokio::test]
    async fn malformed_body_reports_raw_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [],
                "usage": { "total_tokens": 0, "prompt_tokens": 0, "completion_tokens": 0 }
            })))
            .mount(&server)
            .await;

        let response = chat(&server.uri()).call_api("Say hi").await;
        let error = response.error_text().unwrap();
        assert!(error.starts_with("API response error: response contained no choices"));
        assert!(error.contains(r#""choices":[]"#));
    }

    #[tokio::test]
    async fn api_error_object_is_a_response_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let response = chat(&server.uri()).call_api("Say hi").await;
        let error = response.error_text().unwrap();
        assert!(error.starts_with("API response error:"));
        assert!(error.contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn transport_failure_is_a_call_error() {
        // Nothing listens on port 9 of the loopback interface.
        let response = chat("http://127.0.0.1:9").call_api("Say hi").await;
        assert!(response.error_text().unwrap().starts_with("API call error:"));
    }

    #[tokio::test]
    async fn timeout_is_a_call_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let env = ProviderEnv {
            request_timeout_ms: Some(50),
            ..ProviderEnv::default().with_api_key("sk-test")
        };
        let config = ProviderConfig {
            api_host: Some(server.uri()),
            ..ProviderConfig::default()
        };
        let provider = OpenAiChatProvider::new(
            "gpt-4",
            OpenAiSettings::resolve(&env, &config).unwrap(),
            Arc::new(ResponseCache::new()),
        )
        .unwrap();
        let response = provider.call_api("Say hi").await;
        assert!(response.error_text().unwrap().starts_with("API call error:"));
    }

    #[tokio::test]
    async fn repeated_calls_hit_the_cache_until_disabled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "cached" } }],
                "usage": { "total_tokens": 1, "prompt_tokens": 1, "completion_tokens": 0 }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let cache = Arc::new(ResponseCache::new());
        let provider = OpenAiChatProvider::new("gpt-4", settings(&server.uri()), cache.clone()).unwrap();
        provider.call_api("same").await;
        provider.call_api("same").await;
        cache.disable();
        let response = provider.call_api("same").await;
        assert_eq!(response.output_text(), Some("cached"));
    }

    async fn answering(reply: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": reply } }],
                "usage": { "total_tokens": 1, "prompt_tokens": 1, "completion_tokens": 0 }
            })))
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn shared_cache_keeps_hosts_apart() {
        let a = answering("from-a").await;
        let b = answering("from-b").await;
        let cache = Arc::new(ResponseCache::new());
        let provider_a = OpenAiChatProvider::new("gpt-4", settings(&a.uri()), cache.clone()).unwrap();
        let provider_b = OpenAiChatProvider::new("gpt-4", settings(&b.uri()), cache).unwrap();

        assert_eq!(provider_a.call_api("same").await.output_text(), Some("from-a"));
        assert_eq!(provider_b.call_api("same").await.output_text(), Some("from-b"));
    }

    #[tokio::test]
    async fn shared_cache_keeps_credentials_apart() {
        let server = MockServer::start().await;
        for (key, reply) in [("sk-one", "for-one"), ("sk-two", "for-two")] {
            Mock::given(method("POST"))
                .and(header("authorization", format!("Bearer {key}").as_str()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "choices": [{ "message": { "content": reply } }],
                    "usage": { "total_tokens": 1, "prompt_tokens": 1, "completion_tokens": 0 }
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let cache = Arc::new(ResponseCache::new());
        let with_key = |key: &str| {
            let config = ProviderConfig {
                api_key: Some(key.to_string()),
                api_host: Some(server.uri()),
                ..ProviderConfig::default()
            };
            let settings = OpenAiSettings::resolve(&ProviderEnv::default(), &config).unwrap();
            OpenAiChatProvider::new("gpt-4", settings, cache.clone()).unwrap()
        };

        assert_eq!(with_key("sk-one").call_api("same").await.output_text(), Some("for-one"));
        assert_eq!(with_key("sk-two").call_api("same").await.output_text(), Some("for-two"));
        assert_eq!(with_key("sk-one").call_api("same").await.output_text(), Some("for-one"));
    }
}

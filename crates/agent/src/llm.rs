use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tawar_core::config::{LlmConfig, LlmProvider};

pub const OPENAI_DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// One request to the generation backend: grounding instructions followed
/// by the mapped transcript and the new buyer message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("generation backend timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("generation backend transport failure: {0}")]
    Transport(String),
    #[error("generation backend protocol failure: {0}")]
    Protocol(String),
}

/// The single untrusted, bounded-latency dependency of an exchange. Every
/// implementation must resolve within its configured timeout.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Client for OpenAI-compatible `chat/completions` endpoints. Both
/// supported providers speak this wire format; Ollama exposes it under
/// `/v1` on its own port.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    timeout: Duration,
    max_retries: u32,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = match (&config.base_url, config.provider) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, LlmProvider::OpenAi) => OPENAI_DEFAULT_BASE_URL.to_string(),
            (None, LlmProvider::Ollama) => "http://localhost:11434/v1".to_string(),
        };
        let endpoint = format!("{base_url}/chat/completions");

        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": request.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let attempt = async {
            let mut http_request = self.http.post(&self.endpoint).json(&body);
            if let Some(api_key) = &self.api_key {
                http_request = http_request.bearer_auth(api_key.expose_secret());
            }

            let response = http_request
                .send()
                .await
                .map_err(|error| LlmError::Transport(error.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(LlmError::Transport(format!("backend error {status}: {detail}")));
            }

            let payload: ApiResponse = response
                .json()
                .await
                .map_err(|error| LlmError::Protocol(error.to_string()))?;

            payload
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or_else(|| LlmError::Protocol("backend returned no completion text".to_string()))
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout { timeout_secs: self.timeout.as_secs() }),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.complete_once(&request).await {
                Ok(reply) => return Ok(reply),
                // A timeout already consumed the whole latency budget; the
                // caller decides whether to resubmit.
                Err(error @ LlmError::Timeout { .. }) => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        event_name = "agent.llm.attempt_failed",
                        attempt = attempt,
                        error = %error,
                        "generation backend attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::Protocol("no attempts executed".to_string())))
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: String,
}

/// Deterministic stand-in for tests: pops scripted replies in order and
/// records every request it saw.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn with_replies(replies: Vec<Result<String, LlmError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), requests: Mutex::new(Vec::new()) }
    }

    pub fn push_reply(&self, reply: Result<String, LlmError>) {
        match self.replies.lock() {
            Ok(mut replies) => replies.push_back(reply),
            Err(poisoned) => poisoned.into_inner().push_back(reply),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request),
            Err(poisoned) => poisoned.into_inner().push(request),
        }

        let next = match self.replies.lock() {
            Ok(mut replies) => replies.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| Err(LlmError::Protocol("scripted replies exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use tawar_core::config::{LlmConfig, LlmProvider};

    use super::{ChatMessage, CompletionRequest, LlmClient, LlmError, OpenAiCompatClient, ScriptedLlm};

    fn config() -> LlmConfig {
        LlmConfig {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: Some("http://localhost:11434/v1/".to_string()),
            model: "llama3.1".to_string(),
            timeout_secs: 30,
            max_retries: 2,
            temperature: 0.7,
            max_tokens: 150,
        }
    }

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let client = OpenAiCompatClient::from_config(&config());
        assert_eq!(client.endpoint, "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn openai_provider_falls_back_to_public_endpoint() {
        let mut config = config();
        config.provider = LlmProvider::OpenAi;
        config.base_url = None;

        let client = OpenAiCompatClient::from_config(&config);
        assert_eq!(client.endpoint, "https://api.openai.com/v1/chat/completions");
    }

    #[tokio::test]
    async fn scripted_llm_replays_in_order_and_records_requests() {
        let llm = ScriptedLlm::with_replies(vec![
            Ok("Siap bos".to_string()),
            Err(LlmError::Timeout { timeout_secs: 30 }),
        ]);
        let request =
            CompletionRequest { messages: vec![ChatMessage::user("net berapa?".to_string())] };

        let first = llm.complete(request.clone()).await;
        assert_eq!(first, Ok("Siap bos".to_string()));

        let second = llm.complete(request.clone()).await;
        assert_eq!(second, Err(LlmError::Timeout { timeout_secs: 30 }));

        let third = llm.complete(request).await;
        assert!(matches!(third, Err(LlmError::Protocol(_))));

        assert_eq!(llm.requests().len(), 3);
    }
}

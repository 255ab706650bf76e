use super::{Backend, BackendError, GenerationRequest, GenerationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";

/// Talks to the Anthropic Messages API. Constructor fails if no API key is
/// present in the environment (spec.md §4.B).
pub struct CloudAnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl CloudAnthropicBackend {
    pub fn from_env(env_var: &str, timeout: Duration) -> Result<Self, String> {
        let api_key = std::env::var(env_var)
            .map_err(|_| format!("{env_var} not set; cloud Anthropic backend unavailable"))?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl Backend for CloudAnthropicBackend {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
        let body = MessagesRequest {
            model: request.model_name,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system_prompt,
            messages: vec![AnthropicMessage { role: "user", content: request.prompt }],
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { BackendError::Timeout } else { BackendError::Transport(e.to_string()) })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(match status.as_u16() {
                401 | 403 => BackendError::Auth(message),
                400..=499 => BackendError::BadRequest(message),
                code => BackendError::ServerError { status: code, message },
            });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let text = parsed.content.into_iter().map(|b| b.text).collect::<String>();

        Ok(GenerationResult {
            text,
            token_count: parsed.usage.map(|u| u.output_tokens),
            elapsed: started.elapsed(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

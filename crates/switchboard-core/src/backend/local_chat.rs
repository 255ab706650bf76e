use super::{Backend, BackendError, GenerationRequest, GenerationResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Talks to an OpenAI-compatible `/chat/completions` endpoint — the shape
/// most local inference servers (vLLM, llama.cpp server, LM Studio)
/// expose.
pub struct LocalChatBackend {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl LocalChatBackend {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            timeout,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    completion_tokens: Option<u32>,
}

#[async_trait]
impl Backend for LocalChatBackend {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system_prompt {
            messages.push(ChatMessage { role: "system", content: system });
        }
        messages.push(ChatMessage { role: "user", content: request.prompt });

        let body = ChatRequest {
            model: request.model_name,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let started = Instant::now();
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), text));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "failed to decode local-chat response body");
            BackendError::Transport(e.to_string())
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        debug!(api_base = %self.api_base, model = request.model_name, "local-chat generate ok");

        Ok(GenerationResult {
            text,
            token_count: parsed.usage.and_then(|u| u.completion_tokens),
            elapsed: started.elapsed(),
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/models", self.api_base))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn close(&self) {}
}

fn classify_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(err.to_string())
    }
}

fn classify_status(status: u16, message: String) -> BackendError {
    match status {
        401 | 403 => BackendError::Auth(message),
        400..=499 => BackendError::BadRequest(message),
        _ => BackendError::ServerError { status, message },
    }
}

use super::{Backend, BackendError, GenerationRequest, GenerationResult};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

/// Talks to an Ollama-shaped `/api/generate` endpoint: a stream of
/// newline-delimited JSON chunks terminated by one chunk with `done: true`.
pub struct LocalGenerateBackend {
    client: reqwest::Client,
    api_base: String,
    timeout: Duration,
}

impl LocalGenerateBackend {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
            timeout,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[async_trait]
impl Backend for LocalGenerateBackend {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
        let body = GenerateRequest {
            model: request.model_name,
            prompt: request.prompt,
            system: request.system_prompt,
            options: GenerateOptions {
                num_predict: request.max_tokens,
                temperature: request.temperature,
            },
        };

        let started = Instant::now();
        let url = format!("{}/api/generate", self.api_base);

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)?
        .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), text));
        }

        let mut stream = response.bytes_stream();
        let mut text = String::new();
        let mut token_count = None;
        let mut carry: Vec<u8> = Vec::new();

        let result: Result<(), BackendError> = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(classify_reqwest_error)?;
                carry.extend_from_slice(&chunk);

                while let Some(pos) = carry.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = carry.drain(..=pos).collect();
                    let line = &line[..line.len() - 1]; // drop the newline
                    if line.is_empty() {
                        continue;
                    }
                    let parsed: GenerateChunk = serde_json::from_slice(line)
                        .map_err(|e| BackendError::Transport(e.to_string()))?;
                    text.push_str(&parsed.response);
                    if parsed.done {
                        token_count = parsed.eval_count;
                        return Ok(());
                    }
                }
            }
            if !carry.is_empty() {
                let parsed: GenerateChunk = serde_json::from_slice(&carry)
                    .map_err(|e| BackendError::Transport(e.to_string()))?;
                text.push_str(&parsed.response);
                if parsed.done {
                    token_count = parsed.eval_count;
                }
            }
            Ok(())
        }
        .await;
        result?;

        debug!(api_base = %self.api_base, model = request.model_name, "local-generate stream complete");

        Ok(GenerationResult {
            text,
            token_count,
            elapsed: started.elapsed(),
        })
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.api_base))
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

use super::{Backend, BackendError, GenerationRequest, GenerationResult};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::warn;

/// Talks to the OpenAI chat-completions API. Constructor fails if no API
/// key is present in the environment (spec.md §4.B).
pub struct CloudOpenAiBackend {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl CloudOpenAiBackend {
    pub fn from_env(env_var: &str, timeout: Duration) -> Result<Self, String> {
        let api_key = std::env::var(env_var)
            .map_err(|_| format!("{env_var} not set; cloud OpenAI backend unavailable"))?;
        let config = OpenAIConfig::new().with_api_key(api_key);
        Ok(Self {
            client: Client::with_config(config),
            timeout,
        })
    }
}

#[async_trait]
impl Backend for CloudOpenAiBackend {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();
        if let Some(system) = request.system_prompt {
            let msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| BackendError::BadRequest(e.to_string()))?;
            messages.push(msg.into());
        }
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt)
            .build()
            .map_err(|e| BackendError::BadRequest(e.to_string()))?;
        messages.push(user_msg.into());

        let body = CreateChatCompletionRequestArgs::default()
            .model(request.model_name)
            .messages(messages)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .map_err(|e| BackendError::BadRequest(e.to_string()))?;

        let started = Instant::now();
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(body))
            .await
            .map_err(|_| BackendError::Timeout)?
            .map_err(classify_openai_error)?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let token_count = response.usage.map(|u| u.completion_tokens);

        Ok(GenerationResult {
            text,
            token_count,
            elapsed: started.elapsed(),
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

fn classify_openai_error(err: async_openai::error::OpenAIError) -> BackendError {
    use async_openai::error::OpenAIError;
    match &err {
        OpenAIError::ApiError(api_err) => {
            let status = api_err
                .code
                .as_ref()
                .and_then(|c| c.parse::<u16>().ok())
                .unwrap_or(500);
            match status {
                401 | 403 => BackendError::Auth(api_err.message.clone()),
                400..=499 => BackendError::BadRequest(api_err.message.clone()),
                _ => BackendError::ServerError { status, message: api_err.message.clone() },
            }
        }
        OpenAIError::Reqwest(e) if e.is_timeout() => BackendError::Timeout,
        other => {
            warn!(error = %other, "cloud-openai request failed");
            BackendError::Transport(other.to_string())
        }
    }
}

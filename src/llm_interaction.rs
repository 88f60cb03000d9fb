use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::constants;
use crate::error::{ChatError, Result};
use crate::profile::ApiKey;
use crate::prompt::{ChatMessage, PromptRequest};

/// The remote text-generation service.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &PromptRequest) -> Result<String>;
}

// Structures matching the OpenAI-compatible /chat/completions endpoint
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Groq chat-completions client. One attempt per turn, bounded by a timeout.
pub struct GroqClient {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    model: String,
    temperature: f32,
}

impl GroqClient {
    pub fn new(api_key: ApiKey, model: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, model, constants::GROQ_URL.as_str())
    }

    pub fn with_base_url(
        api_key: ApiKey,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(constants::GENERATION_TIMEOUT)
            .build()
            .map_err(|e| ChatError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            temperature: constants::TEMPERATURE,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Generator for GroqClient {
    async fn generate(&self, request: &PromptRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, pairs = request.history.len(), "Requesting Groq completion");
        let payload = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: request.messages(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!("Groq request failed: {}", e);
                let cause = if e.is_timeout() {
                    "the service took too long to answer".to_string()
                } else {
                    format!("could not reach the service ({e})")
                };
                ChatError::Generation(cause)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Groq API request failed");
            let cause = match status.as_u16() {
                401 | 403 => "the API key was rejected".to_string(),
                429 => "rate limited, please wait a moment and try again".to_string(),
                _ => format!("service returned status {status}"),
            };
            return Err(ChatError::Generation(cause));
        }

        let completion = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| ChatError::Generation(format!("unreadable response: {e}")))?;

        let reply = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ChatError::Generation("the service returned an empty reply".to_string()))?;

        debug!(chars = reply.len(), "Received Groq reply");
        Ok(reply)
    }
}

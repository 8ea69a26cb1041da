use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use adlens_core::{
    CompletionRequest, CompletionResponse, Error, ResponseFormat, Result, TokenUsage,
    UpstreamClient,
};

/// Default chat-completions endpoint URL.
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat-completions client.
///
/// Works against any endpoint speaking the chat-completions dialect; the
/// base URL is configurable so the same client covers alternative hosts.
pub struct OpenAiCompatClient {
    /// HTTP client for API requests.
    client: Client,
    /// Chat-completions endpoint URL.
    api_url: String,
}

impl OpenAiCompatClient {
    /// Creates a client against the default endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::default(),
            api_url: DEFAULT_API_URL.to_owned(),
        }
    }

    /// Overrides the chat-completions endpoint URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl Default for OpenAiCompatClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Request payload sent to the chat-completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    /// Model identifier string understood by the endpoint.
    model: String,
    /// Conversation messages for the request.
    messages: Vec<ChatMessage>,
    /// Sampling temperature.
    temperature: f32,
    /// Maximum completion tokens.
    max_tokens: u32,
    /// Optional structured-output directive.
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonValue>,
}

/// A single chat message.
#[derive(Debug, Serialize)]
struct ChatMessage {
    /// Role of the message author (`system` or `user`).
    role: String,
    /// Textual content of the message.
    content: String,
}

/// Response payload returned by the endpoint.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    /// Candidate completions.
    choices: Vec<ChatChoice>,
    /// Token accounting, when the endpoint reports it.
    usage: Option<ChatUsage>,
}

/// A single completion choice.
#[derive(Debug, Deserialize)]
struct ChatChoice {
    /// Generated message.
    message: ChatResponseMessage,
}

/// Response message containing the generated text.
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    /// Generated text content.
    content: String,
}

/// Token usage metrics reported by the endpoint.
#[derive(Debug, Deserialize)]
struct ChatUsage {
    /// Prompt token count.
    prompt_tokens: u64,
    /// Completion token count.
    completion_tokens: u64,
}

#[async_trait]
impl UpstreamClient for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai-compat"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        api_key: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        if api_key.is_empty() {
            return Err(Error::MissingApiKey("empty upstream credential".to_owned()));
        }

        let response_format = match request.options.response_format {
            ResponseFormat::Text => None,
            ResponseFormat::Json => Some(json!({"type": "json_object"})),
        };

        let payload = ChatRequest {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_owned(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_owned(),
                    content: request.user_prompt.clone(),
                },
            ],
            temperature: request.options.temperature,
            max_tokens: request.options.max_tokens,
            response_format,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| Error::Provider(format!("upstream request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_owned());

            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                Error::QuotaExhausted(format!("upstream returned 429: {body}"))
            } else {
                Error::Provider(format!("upstream error {status}: {body}"))
            });
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|err| Error::InvalidResponse(format!("failed to parse response: {err}")))?;

        let text = chat_response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| Error::InvalidResponse("no choices in response".to_owned()))?;

        let usage = chat_response.usage.map_or_else(TokenUsage::default, |usage| TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
        });

        Ok(CompletionResponse { text, usage })
    }
}

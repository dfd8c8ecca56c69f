//! OpenAI chat completions backend.
//!
//! Structured (`json_schema` response format) and streaming completions over
//! the REST API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::streaming::ChatCompletionStream;
use super::{CompletionRequest, LanguageModel, ModelError, OutputSchema, TokenStream};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible language model client
#[derive(Clone)]
pub struct OpenAiModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Timeout for non-streaming requests
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    #[serde(default)]
    choices: Vec<ChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct ChoiceRaw {
    message: MessageRaw,
}

#[derive(Debug, Deserialize)]
struct MessageRaw {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiModel {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_API_URL.to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Set a custom base URL (for Azure, proxies, compatible servers)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn chat_request<'a>(request: &'a CompletionRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            response_format: None,
            stream: false,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.request_timeout)
        } else {
            ModelError::Network(e.to_string())
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if !body.stream {
            builder = builder.timeout(self.request_timeout);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, model = body.model, "OpenAI request failed");
            self.map_send_error(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "OpenAI API error");
            return Err(ModelError::Api(format!("{}: {}", status, error_text)));
        }

        Ok(response)
    }

    /// Send a non-streaming request and return the first choice's content
    async fn send_for_content(&self, body: &ChatRequest<'_>) -> Result<String, ModelError> {
        let start = Instant::now();
        let response = self.send(body).await?;

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        let message = raw
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ModelError::Api("No choices in response".into()))?;

        debug!(
            model = body.model,
            duration_ms = start.elapsed().as_millis() as u64,
            "OpenAI chat completion"
        );

        if let Some(refusal) = message.refusal {
            return Err(ModelError::Api(format!("Model refused: {}", refusal)));
        }

        message
            .content
            .ok_or_else(|| ModelError::Api("Empty response content".into()))
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ModelError> {
        let mut body = Self::chat_request(request);
        body.response_format = Some(serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": true,
            }
        }));

        let content = self.send_for_content(&body).await?;

        serde_json::from_str(&content).map_err(|e| ModelError::Schema {
            type_name: schema.name.clone(),
            message: format!("response is not valid JSON: {}", e),
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream, ModelError> {
        let mut body = Self::chat_request(request);
        body.stream = true;

        let response = self.send(&body).await?;
        Ok(ChatCompletionStream::new(response.bytes_stream()).boxed())
    }
}

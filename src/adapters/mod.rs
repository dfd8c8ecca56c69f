//! Adapter interfaces for external systems.
//!
//! Adapters give the pipeline a narrow view of its collaborators:
//! - `LanguageModel`: turn a prompt into text, into a typed value, or into a
//!   stream of text fragments
//! - `WebSearch`: look up evidence for a claim
//!
//! Retries belong here (see `RetryingModel` and `RetryingSearch`), never in
//! the graph engine.

pub mod openai;
pub mod retry;
pub mod schema;
pub mod serper;
pub mod streaming;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::OpenAiModel;
pub use retry::{RetryPolicy, RetryingModel, RetryingSearch};
pub use schema::StructuredOutput;
pub use serper::SerperSearch;

/// Errors raised by external collaborators
#[derive(Debug, Error)]
pub enum ModelError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// API error (non-2xx response, rate limit, invalid request)
    #[error("API error: {0}")]
    Api(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Response does not conform to the expected shape
    #[error("Response does not match schema '{type_name}': {message}")]
    Schema { type_name: String, message: String },

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl ModelError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Api(_) | Self::Timeout(_))
    }
}

/// A single prompt sent to a language model
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model name (e.g. "gpt-4o-mini")
    pub model: String,

    /// Optional system instructions
    pub system: Option<String>,

    /// User prompt
    pub prompt: String,

    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: Some(0.0),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

}

/// JSON schema describing the expected output of a structured call
#[derive(Debug, Clone)]
pub struct OutputSchema {
    /// Schema name (the Rust type name)
    pub name: String,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    pub fn of<T: StructuredOutput>() -> Self {
        Self {
            name: T::type_name(),
            schema: T::openai_schema(),
        }
    }
}

/// Stream of text fragments from a generation
pub type TokenStream = BoxStream<'static, Result<String, ModelError>>;

/// Trait for language model backends
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Completion constrained to `schema`, returned as raw JSON
    async fn complete_structured(
        &self,
        request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, ModelError>;

    /// Text completion delivered fragment by fragment
    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream, ModelError>;
}

/// Ask `model` for a value of type `T`.
///
/// Fails with `ModelError::Schema` when the answer cannot be decoded as `T`.
pub async fn extract<T: StructuredOutput>(
    model: &dyn LanguageModel,
    request: &CompletionRequest,
) -> Result<T, ModelError> {
    let schema = OutputSchema::of::<T>();
    let value = model.complete_structured(request, &schema).await?;

    serde_json::from_value(value).map_err(|e| ModelError::Schema {
        type_name: schema.name,
        message: e.to_string(),
    })
}

/// A single web search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Trait for web search backends
#[async_trait]
pub trait WebSearch: Send + Sync {
    fn name(&self) -> &str;

    /// Top results for `query`
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ModelError>;
}

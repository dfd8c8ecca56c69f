//! Serper (Google search API) backend for claim evidence.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ModelError, SearchHit, WebSearch};

const SERPER_URL: &str = "https://google.serper.dev/search";

/// Results kept per query
const TOP_K: usize = 5;

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
}

/// Web search through serper.dev
#[derive(Clone)]
pub struct SerperSearch {
    http: reqwest::Client,
    api_key: String,
    timeout: Duration,
}

impl SerperSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(20),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl WebSearch for SerperSearch {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ModelError> {
        let response = self
            .http
            .post(SERPER_URL)
            .header("X-API-KEY", &self.api_key)
            .timeout(self.timeout)
            .json(&serde_json::json!({ "q": query, "num": TOP_K }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout(self.timeout)
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_text, "Serper API error");
            return Err(ModelError::Api(format!("Serper {}: {}", status, error_text)));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        debug!(query, hits = parsed.organic.len(), "Serper search");

        Ok(parsed.organic.into_iter().take(TOP_K).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "searchParameters": {"q": "x"},
            "organic": [
                {"title": "A", "link": "https://a.example", "snippet": "first", "position": 1},
                {"title": "B", "link": "https://b.example", "position": 2}
            ]
        }"#;

        let parsed: SerperResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.organic.len(), 2);
        assert_eq!(parsed.organic[0].snippet, "first");
        assert_eq!(parsed.organic[1].snippet, "");
    }

    #[test]
    fn test_missing_organic_results() {
        let parsed: SerperResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.organic.is_empty());
    }
}

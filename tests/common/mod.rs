//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use clarifai::adapters::{
    CompletionRequest, LanguageModel, ModelError, OutputSchema, SearchHit, TokenStream, WebSearch,
};
use clarifai::core::{Pipeline, Services};
use clarifai::{Configuration, VerificationSource};

/// A language model that answers from a script keyed by output schema name
#[derive(Default)]
pub struct ScriptedModel {
    answers: HashMap<String, Value>,
    failures: HashMap<String, String>,
    tokens: Vec<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, schema: &str, value: Value) -> Self {
        self.answers.insert(schema.to_string(), value);
        self
    }

    pub fn fail(mut self, schema: &str, message: &str) -> Self {
        self.failures.insert(schema.to_string(), message.to_string());
        self
    }

    pub fn delay(mut self, schema: &str, delay: Duration) -> Self {
        self.delays.insert(schema.to_string(), delay);
        self
    }

    pub fn tokens(mut self, tokens: &[&str]) -> Self {
        self.tokens = tokens.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Schema names (or "stream") in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, what: &str) -> bool {
        self.calls().iter().any(|c| c == what)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete_structured(
        &self,
        _request: &CompletionRequest,
        schema: &OutputSchema,
    ) -> Result<Value, ModelError> {
        self.calls.lock().unwrap().push(schema.name.clone());
        if let Some(delay) = self.delays.get(&schema.name) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(message) = self.failures.get(&schema.name) {
            return Err(ModelError::Api(message.clone()));
        }
        self.answers
            .get(&schema.name)
            .cloned()
            .ok_or_else(|| ModelError::Api(format!("unscripted schema {}", schema.name)))
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<TokenStream, ModelError> {
        self.calls.lock().unwrap().push("stream".to_string());
        let tokens: Vec<Result<String, ModelError>> =
            self.tokens.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(tokens).boxed())
    }
}

/// A search backend returning one fixed hit per query
#[derive(Default)]
pub struct FakeSearch {
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for FakeSearch {
    fn name(&self) -> &str {
        "fake"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ModelError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(vec![SearchHit {
            title: "Encyclopedia".to_string(),
            link: "https://encyclopedia.example/entry".to_string(),
            snippet: format!("Reference material on: {}", query),
        }])
    }
}

pub const TEXT: &str = "The Eiffel Tower is 330 metres tall. Everyone knows Paris is the most wonderful city on Earth.";

pub fn claims_answer() -> Value {
    json!({"items": [
        {"content": "The Eiffel Tower is 330 metres tall", "segment_id": 0}
    ]})
}

pub fn no_claims_answer() -> Value {
    json!({"items": []})
}

pub fn biases_answer() -> Value {
    json!({"items": [{
        "content": "the most wonderful city on Earth",
        "segment_id": 1,
        "bias_type": "exaggeration",
        "explanation": "Superlative presented as common knowledge"
    }]})
}

pub fn verified_answer() -> Value {
    json!({"items": [{
        "content": "The Eiffel Tower is 330 metres tall",
        "segment_id": 0,
        "verdict": "true",
        "explanation": "Height including antennas",
        "sources": ["https://encyclopedia.example/entry"]
    }]})
}

/// A model scripted for a full run that finds one claim and one bias
pub fn full_model() -> ScriptedModel {
    ScriptedModel::new()
        .answer("Claims", claims_answer())
        .answer("Biases", biases_answer())
        .answer("VerifiedClaims", verified_answer())
        .tokens(&["The text is ", "mostly reliable."])
}

/// Configuration with segments small enough to split `TEXT` in two
pub fn configuration(source: VerificationSource) -> Configuration {
    Configuration {
        claim_verification_source: source,
        segments_chunk_size: 50,
        ..Default::default()
    }
}

pub fn pipeline(model: Arc<ScriptedModel>, source: VerificationSource) -> Pipeline {
    Pipeline::new(configuration(source), Services::new(model)).unwrap()
}

pub fn pipeline_with_search(model: Arc<ScriptedModel>, search: Arc<FakeSearch>) -> Pipeline {
    Pipeline::new(
        configuration(VerificationSource::Web),
        Services::new(model).with_search(search),
    )
    .unwrap()
}

//! The contract between the engine and the stages it runs.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::adapters::{LanguageModel, ModelError, WebSearch};
use crate::domain::{GraphEvent, State, StateUpdate};

/// Identifier of a stage in the fact-checking graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Preprocess,
    DetectBiases,
    ExtractClaims,
    VerifyClaimsLlm,
    VerifyClaimsWeb,
    AggregateVerdict,
    ExportReport,
}

impl NodeId {
    pub const ALL: [NodeId; 7] = [
        NodeId::Preprocess,
        NodeId::DetectBiases,
        NodeId::ExtractClaims,
        NodeId::VerifyClaimsLlm,
        NodeId::VerifyClaimsWeb,
        NodeId::AggregateVerdict,
        NodeId::ExportReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::DetectBiases => "detect_biases",
            Self::ExtractClaims => "extract_claims",
            Self::VerifyClaimsLlm => "verify_claims_llm",
            Self::VerifyClaimsWeb => "verify_claims_web",
            Self::AggregateVerdict => "aggregate_verdict",
            Self::ExportReport => "export_report",
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage failure
#[derive(Debug, Error)]
pub enum NodeError {
    /// The model or search call failed, or its answer did not fit the schema
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("{0}")]
    Invalid(String),
}

/// Something observers of a live run are told about
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionEvent {
    /// A fragment of generated text from a token-streaming node
    Token { node: NodeId, text: String },

    /// A node completed and contributed events to the state
    NodeUpdate {
        node: NodeId,
        events: Vec<GraphEvent>,
    },
}

/// External collaborators available to every stage
#[derive(Clone)]
pub struct Services {
    pub model: Arc<dyn LanguageModel>,
    pub search: Option<Arc<dyn WebSearch>>,
}

impl Services {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.search = Some(search);
        self
    }
}

/// Per-invocation context handed to a node
pub struct NodeContext {
    pub run_id: Uuid,
    pub node: NodeId,
    services: Services,
    tokens: Option<UnboundedSender<ExecutionEvent>>,
}

impl NodeContext {
    pub fn new(run_id: Uuid, node: NodeId, services: Services) -> Self {
        Self {
            run_id,
            node,
            services,
            tokens: None,
        }
    }

    /// Forward generated text to `sink` as `ExecutionEvent::Token`
    pub fn with_token_sink(mut self, sink: UnboundedSender<ExecutionEvent>) -> Self {
        self.tokens = Some(sink);
        self
    }

    pub fn model(&self) -> &dyn LanguageModel {
        self.services.model.as_ref()
    }

    pub fn search(&self) -> Option<&dyn WebSearch> {
        self.services.search.as_deref()
    }

    /// Publish a text fragment.
    ///
    /// A no-op without a sink; a closed sink is ignored so that a departed
    /// stream consumer never fails the run.
    pub fn emit_token(&self, text: &str) {
        if let Some(sink) = &self.tokens {
            let _ = sink.send(ExecutionEvent::Token {
                node: self.node,
                text: text.to_string(),
            });
        }
    }
}

/// A unit of work in the graph.
///
/// Nodes read the state snapshot they are given and return a partial update;
/// they never mutate shared state.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names() {
        let names: Vec<&str> = NodeId::ALL.iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "preprocess",
                "detect_biases",
                "extract_claims",
                "verify_claims_llm",
                "verify_claims_web",
                "aggregate_verdict",
                "export_report"
            ]
        );
        assert_eq!(
            serde_json::to_string(&NodeId::VerifyClaimsWeb).unwrap(),
            "\"verify_claims_web\""
        );
    }
}

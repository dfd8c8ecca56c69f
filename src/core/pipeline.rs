//! The fact-checking pipeline: graph topology plus a facade that runs it.

use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;

use crate::config::{Configuration, ExecutionLimits, VerificationSource};
use crate::domain::State;
use crate::nodes::{
    AggregateVerdict, DetectBiases, ExportReport, ExtractClaims, Preprocess, VerifyClaimsByModel,
    VerifyClaimsByWeb,
};

use super::engine::{Engine, Execution};
use super::graph::{Graph, GraphBuilder, GraphError, NodeOptions, Route, Target, END, START};
use super::node::{NodeId, Services};
use super::stream::{stream_run, StreamMessage};

pub const GRAPH_NAME: &str = "myth-buster-ai";

/// Choose the branch after claim extraction.
///
/// No claims skips verification; otherwise the configured source decides.
pub fn continue_to_verify_claims(state: &State) -> Route {
    if state.claims.is_empty() {
        return Route::NoClaims;
    }
    match state.configuration.claim_verification_source {
        VerificationSource::Web => Route::WebVerification,
        VerificationSource::Llm => Route::LlmVerification,
    }
}

/// Build the fact-checking graph.
///
/// ```text
/// START → preprocess ─┬→ detect_biases ──────────────────────┐
///                     └→ extract_claims ─┬ no_claims ────────→ aggregate_verdict (deferred) → export_report → END
///                                        ├ web → verify_claims_web ─┤
///                                        └ llm → verify_claims_llm ─┘
/// ```
pub fn fact_check_graph() -> Result<Graph, GraphError> {
    GraphBuilder::new(GRAPH_NAME)
        .add_node(NodeId::Preprocess, Preprocess)
        .add_node(NodeId::DetectBiases, DetectBiases)
        .add_node(NodeId::ExtractClaims, ExtractClaims)
        .add_node(NodeId::VerifyClaimsLlm, VerifyClaimsByModel)
        .add_node(NodeId::VerifyClaimsWeb, VerifyClaimsByWeb)
        .add_node_with(
            NodeId::AggregateVerdict,
            AggregateVerdict,
            NodeOptions::deferred().streams_tokens(),
        )
        .add_node(NodeId::ExportReport, ExportReport)
        .add_edge(START, NodeId::Preprocess)
        .add_edge(NodeId::Preprocess, NodeId::DetectBiases)
        .add_edge(NodeId::Preprocess, NodeId::ExtractClaims)
        .add_conditional_edges(
            NodeId::ExtractClaims,
            continue_to_verify_claims,
            [
                (Route::NoClaims, Target::from(NodeId::AggregateVerdict)),
                (Route::WebVerification, Target::from(NodeId::VerifyClaimsWeb)),
                (Route::LlmVerification, Target::from(NodeId::VerifyClaimsLlm)),
            ],
        )
        .add_edge(NodeId::DetectBiases, NodeId::AggregateVerdict)
        .add_edge(NodeId::VerifyClaimsLlm, NodeId::AggregateVerdict)
        .add_edge(NodeId::VerifyClaimsWeb, NodeId::AggregateVerdict)
        .add_edge(NodeId::AggregateVerdict, NodeId::ExportReport)
        .add_edge(NodeId::ExportReport, END)
        .compile()
}

/// Runs the fact-checking graph with one configuration and set of services
#[derive(Clone)]
pub struct Pipeline {
    engine: Arc<Engine>,
    configuration: Arc<Configuration>,
}

impl Pipeline {
    pub fn new(configuration: Configuration, services: Services) -> Result<Self, GraphError> {
        Self::with_engine(configuration, services, ExecutionLimits::default(), None)
    }

    pub fn with_engine(
        configuration: Configuration,
        services: Services,
        limits: ExecutionLimits,
        journal_dir: Option<PathBuf>,
    ) -> Result<Self, GraphError> {
        let graph = Arc::new(fact_check_graph()?);
        let mut engine = Engine::new(graph, services).with_limits(limits);
        if let Some(dir) = journal_dir {
            engine = engine.with_journal_dir(dir);
        }

        Ok(Self {
            engine: Arc::new(engine),
            configuration: Arc::new(configuration),
        })
    }

    pub fn graph(&self) -> &Graph {
        self.engine.graph()
    }

    pub fn check_input(&self, content: &str) -> Result<(), GraphError> {
        self.engine.check_input(content)
    }

    fn initial_state(&self, content: impl Into<String>) -> State {
        State::new(content, Arc::clone(&self.configuration))
    }

    /// Analyze `content` and return the final state
    pub async fn run(&self, content: impl Into<String>) -> Result<Execution, GraphError> {
        self.engine.run(self.initial_state(content)).await
    }

    /// Analyze `content`, streaming progress as it happens
    pub fn stream(&self, content: impl Into<String>) -> impl Stream<Item = StreamMessage> + Send {
        stream_run(Arc::clone(&self.engine), self.initial_state(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Claim, Claims};

    fn state(source: VerificationSource, claims: usize) -> State {
        let configuration = Configuration {
            claim_verification_source: source,
            ..Default::default()
        };
        let mut state = State::new("x", Arc::new(configuration));
        state.claims = Claims {
            items: (0..claims)
                .map(|i| Claim {
                    content: format!("claim {}", i),
                    segment_id: 0,
                })
                .collect(),
        };
        state
    }

    #[test]
    fn test_routing() {
        assert_eq!(
            continue_to_verify_claims(&state(VerificationSource::Web, 0)),
            Route::NoClaims
        );
        assert_eq!(
            continue_to_verify_claims(&state(VerificationSource::Llm, 0)),
            Route::NoClaims
        );
        assert_eq!(
            continue_to_verify_claims(&state(VerificationSource::Web, 2)),
            Route::WebVerification
        );
        assert_eq!(
            continue_to_verify_claims(&state(VerificationSource::Llm, 1)),
            Route::LlmVerification
        );
    }

    #[test]
    fn test_graph_topology() {
        let graph = fact_check_graph().unwrap();

        assert_eq!(graph.name(), GRAPH_NAME);
        assert_eq!(graph.node_ids().count(), 7);
        assert_eq!(graph.entry(), &[Target::Node(NodeId::Preprocess)]);

        let options = graph.options(NodeId::AggregateVerdict);
        assert!(options.deferred);
        assert!(options.streams_tokens);
        assert!(!graph.options(NodeId::ExtractClaims).deferred);

        let preds: Vec<NodeId> = graph.predecessors(NodeId::AggregateVerdict).collect();
        assert_eq!(
            preds,
            vec![
                NodeId::DetectBiases,
                NodeId::ExtractClaims,
                NodeId::VerifyClaimsLlm,
                NodeId::VerifyClaimsWeb
            ]
        );
    }

    #[test]
    fn test_mermaid_shows_routes() {
        let diagram = fact_check_graph().unwrap().to_mermaid();

        assert!(diagram.contains("extract_claims -. &nbsp;no_claims&nbsp; .-> aggregate_verdict;"));
        assert!(diagram.contains("extract_claims -. &nbsp;web_verification&nbsp; .-> verify_claims_web;"));
        assert!(diagram.contains("export_report --> __end__;"));
        assert!(diagram.contains("defer"));
    }
}

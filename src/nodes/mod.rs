//! The stages of the fact-checking graph.
//!
//! Each stage reads the state snapshot it is given, makes at most one kind
//! of external call, and returns a partial update.

mod aggregate_verdict;
mod detect_biases;
mod export_report;
mod extract_claims;
mod preprocess;
mod verify_claims;

pub use aggregate_verdict::{AggregateVerdict, NO_CLAIMS_REPORT};
pub use detect_biases::DetectBiases;
pub use export_report::ExportReport;
pub use extract_claims::ExtractClaims;
pub use preprocess::Preprocess;
pub use verify_claims::{VerifyClaimsByModel, VerifyClaimsByWeb};

use tracing::warn;

use crate::domain::{retain_known_segments, Segment, SegmentScoped};

/// Drop model output pointing at segments that do not exist
fn keep_known_segments<T: SegmentScoped>(what: &str, items: &mut Vec<T>, segments: &[Segment]) {
    let dropped = retain_known_segments(items, segments);
    if dropped > 0 {
        warn!(what, dropped, "Dropped items referencing unknown segments");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::Value;
    use uuid::Uuid;

    use crate::adapters::{
        CompletionRequest, LanguageModel, ModelError, OutputSchema, SearchHit, TokenStream,
        WebSearch,
    };
    use crate::core::{NodeContext, NodeId, Services};

    /// Answers structured calls by schema name and streams fixed tokens
    #[derive(Default)]
    pub struct ScriptedModel {
        pub answers: HashMap<String, Value>,
        pub tokens: Vec<String>,
        pub prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedModel {
        pub fn answer(mut self, schema: &str, value: Value) -> Self {
            self.answers.insert(schema.to_string(), value);
            self
        }

        pub fn tokens(mut self, tokens: &[&str]) -> Self {
            self.tokens = tokens.iter().map(|t| t.to_string()).collect();
            self
        }

        pub fn calls(&self) -> Vec<CompletionRequest> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete_structured(
            &self,
            request: &CompletionRequest,
            schema: &OutputSchema,
        ) -> Result<Value, ModelError> {
            self.prompts.lock().unwrap().push(request.clone());
            self.answers
                .get(&schema.name)
                .cloned()
                .ok_or_else(|| ModelError::Api(format!("no answer for {}", schema.name)))
        }

        async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream, ModelError> {
            self.prompts.lock().unwrap().push(request.clone());
            let tokens: Vec<Result<String, ModelError>> =
                self.tokens.iter().cloned().map(Ok).collect();
            Ok(futures::stream::iter(tokens).boxed())
        }
    }

    /// Returns one hit per query, echoing the query
    pub struct EchoSearch;

    #[async_trait]
    impl WebSearch for EchoSearch {
        fn name(&self) -> &str {
            "echo"
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ModelError> {
            Ok(vec![SearchHit {
                title: format!("About {}", query),
                link: "https://example.org/evidence".to_string(),
                snippet: format!("Evidence for {}", query),
            }])
        }
    }

    pub fn context_with(node: NodeId, model: Arc<dyn LanguageModel>) -> NodeContext {
        NodeContext::new(Uuid::new_v4(), node, Services::new(model))
    }

    pub fn context() -> NodeContext {
        context_with(NodeId::Preprocess, Arc::new(ScriptedModel::default()))
    }
}

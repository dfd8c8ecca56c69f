use async_trait::async_trait;
use tracing::info;

use crate::adapters::{extract, CompletionRequest};
use crate::core::{Node, NodeContext, NodeError};
use crate::domain::{format_segments, Claims, GraphEvent, State, StateUpdate};

use super::keep_known_segments;

const PROMPT: &str = r#"You extract the explicit factual claims contained in a text.

A factual claim:
- is a statement that can be checked as true or false,
- is phrased affirmatively,
- is not an opinion, a question or a vague comment.

You will receive a list of segments. For each one, decide whether it contains a factual claim and, if so, extract it as written (or rephrase it slightly so it is self-contained and understandable out of context). Keep the id of the segment each claim comes from.

Examples of claims:
- "Vaccine X was responsible for 400 side effects in 2022."
- "Average temperature has risen by 1.1°C since 1900."
- "Article 15 of the GDPR grants a right of access to personal data."

Segments:
{segments}"#;

/// Extracts checkable factual claims from the segments
pub struct ExtractClaims;

#[async_trait]
impl Node for ExtractClaims {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        let mut claims = if state.segments.is_empty() {
            Claims::default()
        } else {
            let prompt = PROMPT.replace("{segments}", &format_segments(&state.segments));
            let request =
                CompletionRequest::new(&state.configuration.extract_claims_model, prompt);
            extract::<Claims>(ctx.model(), &request).await?
        };
        keep_known_segments("claims", &mut claims.items, &state.segments);

        info!(claims = claims.len(), "Extracted claims");

        let event = GraphEvent::new("claims").with("claims", &claims.items);

        Ok(StateUpdate::new().claims(claims).event(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;
    use crate::domain::Segment;
    use crate::nodes::test_support::{context_with, ScriptedModel};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_extracts_claims_and_emits_event() {
        let model = Arc::new(ScriptedModel::default().answer(
            "Claims",
            json!({"items": [
                {"content": "The Eiffel Tower is 330 metres tall", "segment_id": 0},
                {"content": "Ghost claim", "segment_id": 9}
            ]}),
        ));
        let ctx = context_with(NodeId::ExtractClaims, model.clone());

        let mut state = State::new("The Eiffel Tower is 330 metres tall.", Arc::default());
        state.segments = vec![Segment::new(0, "The Eiffel Tower is 330 metres tall.")];

        let update = ExtractClaims.run(&state, &ctx).await.unwrap();

        let claims = update.claims.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims.items[0].segment_id, 0);
        assert_eq!(update.events[0].step, "claims");
        assert_eq!(
            update.events[0].data["claims"][0]["content"],
            "The Eiffel Tower is 330 metres tall"
        );

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "gpt-4o-mini");
        assert!(calls[0]
            .prompt
            .contains("id: 0 - content: The Eiffel Tower is 330 metres tall."));
    }

    #[tokio::test]
    async fn test_no_segments_skips_model() {
        let model = Arc::new(ScriptedModel::default());
        let ctx = context_with(NodeId::ExtractClaims, model.clone());
        let state = State::new("", Arc::default());

        let update = ExtractClaims.run(&state, &ctx).await.unwrap();

        assert!(update.claims.unwrap().is_empty());
        assert_eq!(update.events.len(), 1);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_fails() {
        let model = Arc::new(ScriptedModel::default().answer("Claims", json!({"oops": true})));
        let ctx = context_with(NodeId::ExtractClaims, model);
        let mut state = State::new("x", Arc::default());
        state.segments = vec![Segment::new(0, "x")];

        let err = ExtractClaims.run(&state, &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            NodeError::Model(crate::adapters::ModelError::Schema { .. })
        ));
    }
}

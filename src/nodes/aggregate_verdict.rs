use async_trait::async_trait;
use futures::StreamExt;
use tracing::info;

use crate::adapters::CompletionRequest;
use crate::core::{Node, NodeContext, NodeError};
use crate::domain::{group_by_segment, State, StateUpdate};

/// Report used when the text contains neither claims nor biases
pub const NO_CLAIMS_REPORT: &str = "No factual claims were found to verify.";

const PROMPT: &str = r#"You are an analyst assessing how reliable a document is.

You will receive:
- A list of claims extracted from the text, with their verification status (true, false, partially true, unverifiable).
- A list of biases detected in the text.

Write a structured summary report that a non-expert can follow, with:
- An overall assessment of the text's reliability.
- The points that call for attention or doubt.
- A concise summary of any biases.
Keep a neutral, factual tone.

Here is what was extracted from the document:

### Claims and verdicts:
{verified_claims}

### Detected biases:
{biases}"#;

/// Writes the narrative report and the per-segment breakdown.
///
/// The report is generated as a stream and each fragment is forwarded to the
/// node context, so observers see it while it is written.
pub struct AggregateVerdict;

#[async_trait]
impl Node for AggregateVerdict {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        let details = group_by_segment(&state.segments, &state.verified_claims, &state.biases);

        if state.verified_claims.is_empty() && state.biases.is_empty() {
            ctx.emit_token(NO_CLAIMS_REPORT);
            info!("Nothing to aggregate");
            return Ok(StateUpdate::new()
                .report(NO_CLAIMS_REPORT)
                .details(details));
        }

        let verified_claims = if state.verified_claims.is_empty() {
            "No verified claims.".to_string()
        } else {
            state.verified_claims.format_for_prompt()
        };
        let biases = if state.biases.is_empty() {
            "No biases detected.".to_string()
        } else {
            state.biases.format_for_prompt()
        };
        let prompt = PROMPT
            .replace("{verified_claims}", &verified_claims)
            .replace("{biases}", &biases);
        let request = CompletionRequest::new(&state.configuration.aggregate_model, prompt);

        let mut tokens = ctx.model().stream(&request).await?;
        let mut report = String::new();
        while let Some(token) = tokens.next().await {
            let token = token?;
            ctx.emit_token(&token);
            report.push_str(&token);
        }

        info!(
            report_chars = report.chars().count(),
            segments = details.len(),
            "Aggregated verdicts"
        );

        Ok(StateUpdate::new().report(report).details(details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExecutionEvent, NodeId};
    use crate::domain::{Bias, Biases, Segment, VerifiedClaim, VerifiedClaims, Verdict};
    use crate::nodes::test_support::{context_with, ScriptedModel};
    use std::sync::Arc;

    fn state_with_findings() -> State {
        let mut state = State::new("...", Arc::default());
        state.segments = vec![Segment::new(0, "first"), Segment::new(1, "second")];
        state.verified_claims = VerifiedClaims {
            items: vec![VerifiedClaim {
                content: "claim".into(),
                segment_id: 1,
                verdict: Verdict::False,
                explanation: "wrong".into(),
                sources: vec![],
            }],
        };
        state.biases = Biases {
            items: vec![Bias {
                content: "biased".into(),
                segment_id: 1,
                bias_type: "emotional".into(),
                explanation: "loaded".into(),
            }],
        };
        state
    }

    #[tokio::test]
    async fn test_report_streamed_to_sink() {
        let model = Arc::new(ScriptedModel::default().tokens(&["The text ", "is unreliable."]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = context_with(NodeId::AggregateVerdict, model.clone()).with_token_sink(tx);

        let update = AggregateVerdict
            .run(&state_with_findings(), &ctx)
            .await
            .unwrap();
        drop(ctx);

        assert_eq!(update.report.as_deref(), Some("The text is unreliable."));
        let details = update.details.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].id, 1);
        assert_eq!(details[0].content, "second");

        let mut tokens = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                ExecutionEvent::Token { node, text } => {
                    assert_eq!(node, NodeId::AggregateVerdict);
                    tokens.push(text);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(tokens, vec!["The text ", "is unreliable."]);

        let calls = model.calls();
        assert_eq!(calls[0].model, "gpt-4o");
        assert!(calls[0].prompt.contains("verdict: false"));
    }

    #[tokio::test]
    async fn test_biases_only_still_calls_model() {
        let model = Arc::new(ScriptedModel::default().tokens(&["Biased."]));
        let ctx = context_with(NodeId::AggregateVerdict, model.clone());
        let mut state = state_with_findings();
        state.verified_claims = VerifiedClaims::default();

        let update = AggregateVerdict.run(&state, &ctx).await.unwrap();

        assert_eq!(update.report.as_deref(), Some("Biased."));
        assert!(model.calls()[0].prompt.contains("No verified claims."));
    }

    #[tokio::test]
    async fn test_nothing_found_skips_model() {
        let model = Arc::new(ScriptedModel::default());
        let ctx = context_with(NodeId::AggregateVerdict, model.clone());

        let update = AggregateVerdict
            .run(&State::new("", Arc::default()), &ctx)
            .await
            .unwrap();

        assert_eq!(update.report.as_deref(), Some(NO_CLAIMS_REPORT));
        assert!(update.details.unwrap().is_empty());
        assert!(model.calls().is_empty());
    }
}

//! Claim verification, either from the model's own knowledge or backed by
//! web search results.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::adapters::{extract, CompletionRequest, SearchHit, WebSearch};
use crate::core::{Node, NodeContext, NodeError};
use crate::domain::{Claim, GraphEvent, State, StateUpdate, VerifiedClaims};

use super::keep_known_segments;

/// Searches run at the same time during web verification
const SEARCH_CONCURRENCY: usize = 4;

const INSTRUCTIONS: &str = r#"You assess the truthfulness of factual claims. For each claim:

1. Say whether it is true, false, partially true, or unverifiable.
2. Give a short, factual explanation.
3. When possible, cite the sources or knowledge you relied on.

Keep the segment_id of each claim in your answer."#;

fn verification_request(model: &str, claims: &str, evidence: Option<&str>) -> CompletionRequest {
    let mut prompt = format!("Claims to verify:\n{}", claims);
    if let Some(evidence) = evidence {
        prompt.push_str(
            "\n\nWeb search results gathered for each claim. Base your verdicts on them and cite their links as sources:\n",
        );
        prompt.push_str(evidence);
    }
    CompletionRequest::new(model, prompt).with_system(INSTRUCTIONS)
}

/// Verifies claims using only the model's knowledge
pub struct VerifyClaimsByModel;

#[async_trait]
impl Node for VerifyClaimsByModel {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        let mut verified = if state.claims.is_empty() {
            VerifiedClaims::default()
        } else {
            let request = verification_request(
                &state.configuration.verify_claims_model,
                &state.claims.format_for_prompt(),
                None,
            );
            extract::<VerifiedClaims>(ctx.model(), &request).await?
        };
        keep_known_segments("verified claims", &mut verified.items, &state.segments);

        info!(verified = verified.len(), "Verified claims with model");

        let event = GraphEvent::new("claims").with("claims", &verified.items);

        Ok(StateUpdate::new().verified_claims(verified).event(event))
    }
}

/// Verifies claims against web search results
pub struct VerifyClaimsByWeb;

impl VerifyClaimsByWeb {
    async fn gather_evidence(
        search: &dyn WebSearch,
        claims: &[Claim],
    ) -> Result<String, NodeError> {
        let queries: Vec<String> = claims.iter().map(|claim| claim.content.clone()).collect();
        let hits: Vec<Vec<SearchHit>> = futures::stream::iter(queries)
            .map(|query| async move { search.search(&query).await })
            .buffered(SEARCH_CONCURRENCY)
            .try_collect()
            .await?;

        let mut evidence = String::new();
        for (claim, hits) in claims.iter().zip(hits) {
            debug!(segment_id = claim.segment_id, hits = hits.len(), "Evidence gathered");
            evidence.push_str(&format!(
                "segment_id: {} - content: {}\n",
                claim.segment_id, claim.content
            ));
            if hits.is_empty() {
                evidence.push_str("  (no results)\n");
            }
            for hit in hits {
                evidence.push_str(&format!("  - {} ({}): {}\n", hit.title, hit.link, hit.snippet));
            }
        }
        Ok(evidence)
    }
}

#[async_trait]
impl Node for VerifyClaimsByWeb {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        if state.claims.is_empty() {
            return Ok(StateUpdate::new().verified_claims(VerifiedClaims::default()));
        }

        let search = ctx.search().ok_or_else(|| {
            NodeError::Invalid("web verification requires a search backend".to_string())
        })?;

        let evidence = Self::gather_evidence(search, &state.claims.items).await?;
        let claims = state
            .claims
            .items
            .iter()
            .map(|claim| format!("segment_id: {} - content: {}", claim.segment_id, claim.content))
            .collect::<Vec<_>>()
            .join("\n");

        let request = verification_request(
            &state.configuration.verify_claims_model,
            &claims,
            Some(&evidence),
        );
        let mut verified = extract::<VerifiedClaims>(ctx.model(), &request).await?;
        keep_known_segments("verified claims", &mut verified.items, &state.segments);

        info!(
            verified = verified.len(),
            search = search.name(),
            "Verified claims with web search"
        );

        Ok(StateUpdate::new().verified_claims(verified))
    }
}

use async_trait::async_trait;
use tracing::info;

use crate::adapters::{extract, CompletionRequest};
use crate::core::{Node, NodeContext, NodeError};
use crate::domain::{format_segments, Biases, State, StateUpdate};

use super::keep_known_segments;

const PROMPT: &str = r#"You detect rhetorical and ideological biases in a text.

A bias is a passage that distorts how the reader perceives the facts, for example:
- emotional: loaded or alarmist wording meant to provoke a reaction,
- ideological: a one-sided framing presented as neutral,
- exaggeration: amplified numbers, generalisations, absolute statements,
- omission: missing context that changes the meaning,
- other: any other distortion you can justify.

You will receive a list of segments. For each bias you find, return the biased passage, the id of its segment, the type of bias and a short explanation. Return an empty list if the text is neutral.

Segments:
{segments}"#;

/// Flags biased passages in the segments
pub struct DetectBiases;

#[async_trait]
impl Node for DetectBiases {
    async fn run(&self, state: &State, ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        if state.segments.is_empty() {
            return Ok(StateUpdate::new().biases(Biases::default()));
        }

        let prompt = PROMPT.replace("{segments}", &format_segments(&state.segments));
        let request = CompletionRequest::new(&state.configuration.extract_biases_model, prompt);
        let mut biases = extract::<Biases>(ctx.model(), &request).await?;
        keep_known_segments("biases", &mut biases.items, &state.segments);

        info!(biases = biases.len(), "Detected biases");

        Ok(StateUpdate::new().biases(biases))
    }
}

use async_trait::async_trait;
use tracing::{info, warn};

use crate::chunking;
use crate::config::SegmentationMode;
use crate::core::{Node, NodeContext, NodeError};
use crate::domain::{GraphEvent, Segment, State, StateUpdate};

/// Trims the input and cuts it into fixed-size segments
pub struct Preprocess;

#[async_trait]
impl Node for Preprocess {
    async fn run(&self, state: &State, _ctx: &NodeContext) -> Result<StateUpdate, NodeError> {
        let configuration = &state.configuration;
        let chunk_size = configuration.segments_chunk_size;
        if chunk_size == 0 {
            return Err(NodeError::Invalid(
                "segments_chunk_size must be at least 1".to_string(),
            ));
        }
        if configuration.segmentation_mode == SegmentationMode::Semantic {
            warn!("Semantic segmentation is not available, using fixed-size chunks");
        }

        let cleaned = state.original_content.trim();
        let segments: Vec<Segment> = chunking::split(cleaned, chunk_size)
            .into_iter()
            .enumerate()
            .map(|(id, chunk)| Segment::new(id as u32, chunk))
            .collect();

        info!(segments = segments.len(), chunk_size, "Created segments");

        let event = GraphEvent::new("segments").with("segments", &segments);

        Ok(StateUpdate::new()
            .cleaned_content(cleaned)
            .segments(segments)
            .event(event))
    }
}

//! Domain types for the fact-checking pipeline.
//!
//! This module contains the core data structures:
//! - Analysis: Segments, claims, biases, verdicts
//! - Events: Graph events and run journal records
//! - State: The record threaded through the graph, and partial updates

pub mod analysis;
pub mod events;
pub mod state;

// Re-export commonly used types
pub use analysis::{
    format_segments, group_by_segment, retain_known_segments, AnalyzedSegment, Bias, Biases,
    Claim, Claims, Segment, SegmentScoped, VerifiedClaim, VerifiedClaims, Verdict,
};
pub use events::{EventLog, GraphEvent, NodeStatus, RecordType, RunRecord};
pub use state::{State, StateUpdate};

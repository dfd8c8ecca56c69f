//! clarifai - fact-checking pipeline
//!
//! Cuts a text into segments, extracts factual claims and detects biases in
//! parallel, verifies the claims (from the model's knowledge or from web
//! search), and writes a reliability report with a per-segment breakdown.
//!
//! # Architecture
//!
//! The analysis is a task graph compiled once and executed per request:
//! - Stages return partial updates that are merged into a per-run state
//! - A conditional edge picks the verification branch
//! - The aggregation stage is deferred until every branch has resolved
//! - Progress is streamed as server-sent events
//!
//! # Modules
//!
//! - `adapters`: External systems (OpenAI, Serper) and retries
//! - `chunking`: Fixed-size text segmentation
//! - `core`: Graph, engine, streaming, run journal
//! - `domain`: Data structures (Segment, Claim, Bias, State)
//! - `nodes`: The stages of the graph
//! - `server`: HTTP API
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API
//! clarifai serve --address 0.0.0.0:8000
//!
//! # Analyze a file and stream progress
//! clarifai analyze --input article.txt --stream
//! ```

pub mod adapters;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod nodes;
pub mod server;

// Re-export main types at crate root for convenience
pub use crate::config::{Configuration, SegmentationMode, VerificationSource};
pub use crate::core::{Execution, GraphError, Pipeline, StreamMessage};
pub use crate::domain::{AnalyzedSegment, State};

//! Core orchestration logic.
//!
//! This module contains:
//! - Node: the contract every stage implements
//! - Graph: graph definition, validation and routing
//! - Engine: executes a graph against one state
//! - Stream: live progress as server-sent-event messages
//! - Journal: append-only run records
//! - Pipeline: the fact-checking graph and a facade to run it

pub mod engine;
pub mod graph;
pub mod journal;
pub mod node;
pub mod pipeline;
pub mod stream;

// Re-export commonly used types
pub use engine::{Engine, Execution};
pub use graph::{Graph, GraphBuilder, GraphError, NodeOptions, Route, Router, Source, Target, END, START};
pub use journal::RunJournal;
pub use node::{ExecutionEvent, Node, NodeContext, NodeError, NodeId, Services};
pub use pipeline::{continue_to_verify_claims, fact_check_graph, Pipeline, GRAPH_NAME};
pub use stream::{format_sse, stream_run, StreamMessage};

//! Live progress of a run as a sequence of typed messages.
//!
//! The run itself executes on its own task; the returned stream only relays
//! what the engine reports. Dropping the stream stops delivery but never
//! cancels the run.

use std::sync::Arc;

use futures::Stream;
use serde_json::Value;
use tracing::warn;

use crate::domain::{GraphEvent, State};

use super::engine::Engine;
use super::node::ExecutionEvent;

/// One message of the analysis stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A fragment of the report as it is generated
    CompletionToken(String),

    /// Events contributed by a completed node
    NodeUpdate { events: Vec<GraphEvent> },

    /// The run failed; always followed by `Completed`
    Error { message: String },

    /// Always the last message
    Completed,
}

impl StreamMessage {
    pub const COMPLETION_TOKEN: &'static str = "completion-token";
    pub const NODE_UPDATE: &'static str = "node-update";
    pub const ERROR: &'static str = "error";
    pub const COMPLETED: &'static str = "completed";

    /// SSE event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::CompletionToken(_) => Self::COMPLETION_TOKEN,
            Self::NodeUpdate { .. } => Self::NODE_UPDATE,
            Self::Error { .. } => Self::ERROR,
            Self::Completed => Self::COMPLETED,
        }
    }

    /// JSON payload carried in the SSE `data` field
    pub fn payload(&self) -> Value {
        match self {
            Self::CompletionToken(text) => Value::String(text.clone()),
            Self::NodeUpdate { events } => serde_json::json!({ "events": events }),
            Self::Error { message } => serde_json::json!({ "message": message }),
            Self::Completed => Value::String(String::new()),
        }
    }

    /// Complete SSE frame: `event: <name>\ndata: <json>\n\n`
    pub fn to_sse_frame(&self) -> String {
        format_sse(&self.payload(), Some(self.event_name()))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<ExecutionEvent> for StreamMessage {
    fn from(event: ExecutionEvent) -> Self {
        match event {
            ExecutionEvent::Token { text, .. } => Self::CompletionToken(text),
            ExecutionEvent::NodeUpdate { events, .. } => Self::NodeUpdate { events },
        }
    }
}

/// Format one server-sent event frame
pub fn format_sse(data: &Value, event: Option<&str>) -> String {
    let mut frame = String::new();
    if let Some(event) = event {
        frame.push_str("event: ");
        frame.push_str(event);
        frame.push('\n');
    }
    frame.push_str("data: ");
    frame.push_str(&data.to_string());
    frame.push_str("\n\n");
    frame
}

/// Run `state` through `engine` and relay its progress.
///
/// Yields completion tokens and node updates in the order they are produced,
/// then an `Error` if the run failed, then exactly one `Completed`.
pub fn stream_run(engine: Arc<Engine>, state: State) -> impl Stream<Item = StreamMessage> + Send {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let run = tokio::spawn(async move { engine.run_observed(state, Some(tx)).await });

    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            yield StreamMessage::from(event);
        }

        match run.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Streamed run failed");
                yield StreamMessage::Error { message: e.to_string() };
            }
            Err(e) => {
                warn!(error = %e, "Streamed run task aborted");
                yield StreamMessage::Error { message: format!("Run aborted: {}", e) };
            }
        }

        yield StreamMessage::Completed;
    }
}

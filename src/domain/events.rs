//! Event types.
//!
//! Two kinds of events live here:
//! - `GraphEvent`: progress notifications a stage contributes to the run
//!   state. They are accumulated in an append-only `EventLog` and streamed
//!   to clients as `node-update` messages.
//! - `RunRecord`: execution bookkeeping written to the optional run journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A progress notification emitted by a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEvent {
    /// Step tag (e.g. "segments", "claims")
    pub step: String,

    /// Structured payload
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl GraphEvent {
    /// Create an event with an empty payload
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            data: Map::new(),
        }
    }

    /// Add a payload entry, serializing `value`.
    ///
    /// Values that fail to serialize are stored as `null`.
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.data.insert(key.into(), value);
        self
    }
}

/// Append-only log of graph events.
///
/// Entries are never removed or reordered. Merging concatenates in the order
/// updates arrive, which under concurrent branches is completion order, not
/// input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog(Vec<GraphEvent>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch of events at the end of the log
    pub fn append(&mut self, events: impl IntoIterator<Item = GraphEvent>) {
        self.0.extend(events);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GraphEvent> {
        self.0.iter()
    }

    /// Step tags in log order
    pub fn steps(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.step.as_str()).collect()
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a GraphEvent;
    type IntoIter = std::slice::Iter<'a, GraphEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// Run journal records
// ============================================================================

/// A single record in the run journal.
///
/// Journals are append-only JSONL files, one per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique identifier for this record
    pub id: Uuid,

    /// When this record was written
    pub timestamp: DateTime<Utc>,

    /// The run this record belongs to
    pub run_id: Uuid,

    /// Node name (if applicable)
    pub node: Option<String>,

    /// Type of record
    pub record_type: RecordType,

    /// Status of the node/run after this record
    pub status: NodeStatus,

    /// Time taken in milliseconds (for finished nodes and runs)
    pub duration_ms: Option<u64>,

    /// Error message if failed
    pub error: Option<String>,
}

impl RunRecord {
    /// Create a new record with the current timestamp
    pub fn new(
        run_id: Uuid,
        node: Option<String>,
        record_type: RecordType,
        status: NodeStatus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            node,
            record_type,
            status,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of journal records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    RunStarted,
    RunCompleted,
    RunFailed,
    NodeStarted,
    NodeCompleted,
    /// Node proven unreachable for the branch taken
    NodeSkipped,
    NodeFailed,
}

/// Execution status of a node or run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_event_payload() {
        let event = GraphEvent::new("segments").with("count", 3).with("ids", vec![0, 1, 2]);

        assert_eq!(event.step, "segments");
        assert_eq!(event.data["count"], 3);
        assert_eq!(event.data["ids"], serde_json::json!([0, 1, 2]));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["step"], "segments");
        assert_eq!(json["data"]["count"], 3);
    }

    #[test]
    fn test_event_log_appends_in_order() {
        let mut log = EventLog::new();
        log.append(vec![GraphEvent::new("segments")]);
        log.append(vec![GraphEvent::new("claims"), GraphEvent::new("claims")]);
        log.append(Vec::new());

        assert_eq!(log.len(), 3);
        assert_eq!(log.steps(), vec!["segments", "claims", "claims"]);
    }

    #[test]
    fn test_event_log_serializes_as_array() {
        let mut log = EventLog::new();
        log.append(vec![GraphEvent::new("claims")]);

        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["step"], "claims");
    }

    #[test]
    fn test_run_record_with_duration_and_error() {
        let record = RunRecord::new(
            Uuid::new_v4(),
            Some("extract_claims".to_string()),
            RecordType::NodeFailed,
            NodeStatus::Failed,
        )
        .with_duration(1500)
        .with_error("Connection timeout".to_string());

        assert_eq!(record.duration_ms, Some(1500));
        assert_eq!(record.error.as_deref(), Some("Connection timeout"));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"record_type\":\"node_failed\""));
    }
}

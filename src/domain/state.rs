//! Run state and partial updates.
//!
//! A `State` is created fresh for every request with only the original
//! content and the configuration set. Stages never mutate it directly: they
//! return a `StateUpdate` which the engine merges field by field.

use std::sync::Arc;

use serde::Serialize;

use crate::config::Configuration;

use super::analysis::{AnalyzedSegment, Biases, Claims, Segment, VerifiedClaims};
use super::events::{EventLog, GraphEvent};

/// The record threaded through the workflow graph
#[derive(Debug, Clone, Serialize)]
pub struct State {
    /// Read-only after the run starts
    #[serde(skip)]
    pub configuration: Arc<Configuration>,

    /// Input as received from the caller
    pub original_content: String,

    /// Input with surrounding whitespace removed
    pub cleaned_content: String,

    pub segments: Vec<Segment>,
    pub claims: Claims,
    pub biases: Biases,
    pub verified_claims: VerifiedClaims,

    /// Narrative reliability report
    pub report: String,

    /// Per-segment breakdown of claims and biases
    pub details: Vec<AnalyzedSegment>,

    /// Append-only progress log
    pub events: EventLog,
}

impl State {
    /// Create the initial state for a run
    pub fn new(original_content: impl Into<String>, configuration: Arc<Configuration>) -> Self {
        Self {
            configuration,
            original_content: original_content.into(),
            cleaned_content: String::new(),
            segments: Vec::new(),
            claims: Claims::default(),
            biases: Biases::default(),
            verified_claims: VerifiedClaims::default(),
            report: String::new(),
            details: Vec::new(),
            events: EventLog::new(),
        }
    }

    /// Merge a partial update.
    ///
    /// Fields set in the update replace the current value; events are
    /// appended after the existing ones.
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            cleaned_content,
            segments,
            claims,
            biases,
            verified_claims,
            report,
            details,
            events,
        } = update;

        if let Some(value) = cleaned_content {
            self.cleaned_content = value;
        }
        if let Some(value) = segments {
            self.segments = value;
        }
        if let Some(value) = claims {
            self.claims = value;
        }
        if let Some(value) = biases {
            self.biases = value;
        }
        if let Some(value) = verified_claims {
            self.verified_claims = value;
        }
        if let Some(value) = report {
            self.report = value;
        }
        if let Some(value) = details {
            self.details = value;
        }
        self.events.append(events);
    }
}

/// A partial state produced by one stage
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub cleaned_content: Option<String>,
    pub segments: Option<Vec<Segment>>,
    pub claims: Option<Claims>,
    pub biases: Option<Biases>,
    pub verified_claims: Option<VerifiedClaims>,
    pub report: Option<String>,
    pub details: Option<Vec<AnalyzedSegment>>,
    pub events: Vec<GraphEvent>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cleaned_content(mut self, value: impl Into<String>) -> Self {
        self.cleaned_content = Some(value.into());
        self
    }

    pub fn segments(mut self, value: Vec<Segment>) -> Self {
        self.segments = Some(value);
        self
    }

    pub fn claims(mut self, value: Claims) -> Self {
        self.claims = Some(value);
        self
    }

    pub fn biases(mut self, value: Biases) -> Self {
        self.biases = Some(value);
        self
    }

    pub fn verified_claims(mut self, value: VerifiedClaims) -> Self {
        self.verified_claims = Some(value);
        self
    }

    pub fn report(mut self, value: impl Into<String>) -> Self {
        self.report = Some(value.into());
        self
    }

    pub fn details(mut self, value: Vec<AnalyzedSegment>) -> Self {
        self.details = Some(value);
        self
    }

    pub fn event(mut self, event: GraphEvent) -> Self {
        self.events.push(event);
        self
    }
}

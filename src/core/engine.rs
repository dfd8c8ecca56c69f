//! Graph executor.
//!
//! Runs a compiled `Graph` against one `State`. Every node whose activating
//! edge fired is launched as soon as it is ready; independent nodes run
//! concurrently and their partial updates are merged one at a time as they
//! complete.
//!
//! Readiness:
//! - a node is *activated* when an edge into it fires
//! - a node no longer reachable (all predecessors resolved, none activated it)
//!   is marked skipped, which may in turn resolve its successors
//! - an activated node is ready immediately, unless it is deferred, in which
//!   case it waits until every predecessor has completed or been skipped

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ExecutionLimits;
use crate::domain::{NodeStatus, RecordType, RunRecord, State, StateUpdate};

use super::graph::{Graph, GraphError, Target};
use super::journal::RunJournal;
use super::node::{ExecutionEvent, NodeContext, NodeId, Services};

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct Execution {
    pub run_id: Uuid,

    /// Fully merged final state
    pub state: State,

    /// Nodes in the order their updates were merged
    pub completed: Vec<NodeId>,

    /// Nodes proven unreachable for the branch taken
    pub skipped: Vec<NodeId>,
}

type NodeOutcome = (NodeId, Duration, Result<StateUpdate, GraphError>);

/// Executes a graph with a fixed set of services
pub struct Engine {
    graph: Arc<Graph>,
    services: Services,
    limits: ExecutionLimits,
    journal_dir: Option<PathBuf>,
}

impl Engine {
    pub fn new(graph: Arc<Graph>, services: Services) -> Self {
        Self {
            graph,
            services,
            limits: ExecutionLimits::default(),
            journal_dir: None,
        }
    }

    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Write a run journal for every run under `dir`
    pub fn with_journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Reject input larger than the configured limit
    pub fn check_input(&self, content: &str) -> Result<(), GraphError> {
        let actual = content.len();
        let limit = self.limits.max_input_bytes;
        if actual > limit {
            return Err(GraphError::InputTooLarge { actual, limit });
        }
        Ok(())
    }

    /// Run to completion and return the final state
    pub async fn run(&self, state: State) -> Result<Execution, GraphError> {
        self.run_observed(state, None).await
    }

    /// Run to completion, reporting progress to `observer`.
    ///
    /// The observer receives a `NodeUpdate` for every completed node that
    /// contributed events, and `Token`s from token-streaming nodes. A closed
    /// observer does not affect the run.
    #[instrument(skip_all, fields(graph = %self.graph.name(), run_id = tracing::field::Empty))]
    pub async fn run_observed(
        &self,
        state: State,
        observer: Option<UnboundedSender<ExecutionEvent>>,
    ) -> Result<Execution, GraphError> {
        self.check_input(&state.original_content)?;

        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        info!(input_bytes = state.original_content.len(), "Starting run");

        let journal = self.open_journal(run_id).await;
        journal_record(
            &journal,
            RunRecord::new(run_id, None, RecordType::RunStarted, NodeStatus::Running),
        )
        .await;

        let started = Instant::now();
        let result = self.execute(run_id, state, observer, &journal).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(execution) => {
                info!(
                    duration_ms,
                    completed = execution.completed.len(),
                    skipped = execution.skipped.len(),
                    "Run completed"
                );
                journal_record(
                    &journal,
                    RunRecord::new(run_id, None, RecordType::RunCompleted, NodeStatus::Completed)
                        .with_duration(duration_ms),
                )
                .await;
            }
            Err(e) => {
                error!(duration_ms, error = %e, "Run failed");
                journal_record(
                    &journal,
                    RunRecord::new(run_id, None, RecordType::RunFailed, NodeStatus::Failed)
                        .with_duration(duration_ms)
                        .with_error(e.to_string()),
                )
                .await;
            }
        }

        result
    }

    async fn open_journal(&self, run_id: Uuid) -> Option<RunJournal> {
        let dir = self.journal_dir.as_ref()?;
        match RunJournal::open(dir, run_id).await {
            Ok(journal) => Some(journal),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Run journal unavailable");
                None
            }
        }
    }

    async fn execute(
        &self,
        run_id: Uuid,
        mut state: State,
        observer: Option<UnboundedSender<ExecutionEvent>>,
        journal: &Option<RunJournal>,
    ) -> Result<Execution, GraphError> {
        let graph = self.graph.as_ref();
        let mut status: BTreeMap<NodeId, NodeStatus> =
            graph.node_ids().map(|id| (id, NodeStatus::Pending)).collect();
        let mut activated: BTreeSet<NodeId> = BTreeSet::new();
        let mut end_reached = false;
        let mut completed = Vec::new();
        let mut skipped = Vec::new();

        for target in graph.entry() {
            match target {
                Target::Node(id) => {
                    activated.insert(*id);
                }
                Target::End => end_reached = true,
            }
        }

        let mut running: FuturesUnordered<BoxFuture<'static, NodeOutcome>> =
            FuturesUnordered::new();

        loop {
            for id in resolve_skipped(graph, &mut status, &activated) {
                debug!(node = %id, "Node skipped");
                journal_record(
                    journal,
                    RunRecord::new(
                        run_id,
                        Some(id.to_string()),
                        RecordType::NodeSkipped,
                        NodeStatus::Skipped,
                    ),
                )
                .await;
                skipped.push(id);
            }

            for id in ready_nodes(graph, &status, &activated) {
                status.insert(id, NodeStatus::Running);
                debug!(node = %id, "Node started");
                journal_record(
                    journal,
                    RunRecord::new(
                        run_id,
                        Some(id.to_string()),
                        RecordType::NodeStarted,
                        NodeStatus::Running,
                    ),
                )
                .await;
                if let Some(launch) = self.launch(run_id, id, &state, observer.as_ref()) {
                    running.push(launch);
                }
            }

            let Some((id, elapsed, result)) = running.next().await else {
                break;
            };
            let duration_ms = elapsed.as_millis() as u64;

            let update = match result {
                Ok(update) => update,
                Err(e) => {
                    status.insert(id, NodeStatus::Failed);
                    journal_record(
                        journal,
                        RunRecord::new(
                            run_id,
                            Some(id.to_string()),
                            RecordType::NodeFailed,
                            NodeStatus::Failed,
                        )
                        .with_duration(duration_ms)
                        .with_error(e.to_string()),
                    )
                    .await;
                    return Err(e);
                }
            };

            let events = update.events.clone();
            state.apply(update);
            status.insert(id, NodeStatus::Completed);
            completed.push(id);
            info!(node = %id, duration_ms, events = events.len(), "Node completed");
            journal_record(
                journal,
                RunRecord::new(
                    run_id,
                    Some(id.to_string()),
                    RecordType::NodeCompleted,
                    NodeStatus::Completed,
                )
                .with_duration(duration_ms),
            )
            .await;

            if !events.is_empty() {
                if let Some(observer) = &observer {
                    let _ = observer.send(ExecutionEvent::NodeUpdate { node: id, events });
                }
            }

            for target in graph.fired_edges(id, &state)? {
                match target {
                    Target::Node(next) => {
                        activated.insert(next);
                    }
                    Target::End => end_reached = true,
                }
            }
        }

        if !end_reached {
            let waiting = status
                .iter()
                .filter(|(_, s)| **s == NodeStatus::Pending)
                .map(|(id, _)| *id)
                .collect();
            return Err(GraphError::Stalled { waiting });
        }

        Ok(Execution {
            run_id,
            state,
            completed,
            skipped,
        })
    }

    /// Start `id` against a snapshot of the current state
    fn launch(
        &self,
        run_id: Uuid,
        id: NodeId,
        state: &State,
        observer: Option<&UnboundedSender<ExecutionEvent>>,
    ) -> Option<BoxFuture<'static, NodeOutcome>> {
        let spec = self.graph.spec(id)?;
        let node = Arc::clone(&spec.node);

        let mut ctx = NodeContext::new(run_id, id, self.services.clone());
        if spec.options.streams_tokens {
            if let Some(observer) = observer {
                ctx = ctx.with_token_sink(observer.clone());
            }
        }

        let snapshot = state.clone();
        let timeout = self.limits.node_timeout();

        Some(
            async move {
                let start = Instant::now();
                let result = match tokio::time::timeout(timeout, node.run(&snapshot, &ctx)).await {
                    Ok(Ok(update)) => Ok(update),
                    Ok(Err(source)) => Err(GraphError::NodeFailed { node: id, source }),
                    Err(_) => Err(GraphError::Timeout {
                        node: id,
                        after: timeout,
                    }),
                };
                (id, start.elapsed(), result)
            }
            .boxed(),
        )
    }
}

async fn journal_record(journal: &Option<RunJournal>, record: RunRecord) {
    if let Some(journal) = journal {
        journal.record(record).await;
    }
}

fn is_resolved(status: NodeStatus) -> bool {
    matches!(status, NodeStatus::Completed | NodeStatus::Skipped)
}

/// Mark every pending, never-activated node whose predecessors are all
/// resolved as skipped, until nothing changes. Returns the newly skipped nodes.
fn resolve_skipped(
    graph: &Graph,
    status: &mut BTreeMap<NodeId, NodeStatus>,
    activated: &BTreeSet<NodeId>,
) -> Vec<NodeId> {
    let mut newly_skipped = Vec::new();

    loop {
        let next: Vec<NodeId> = status
            .iter()
            .filter(|(id, s)| **s == NodeStatus::Pending && !activated.contains(id))
            .map(|(id, _)| *id)
            .filter(|id| {
                graph
                    .predecessors(*id)
                    .all(|p| status.get(&p).copied().is_some_and(is_resolved))
            })
            .collect();

        if next.is_empty() {
            return newly_skipped;
        }
        for id in next {
            status.insert(id, NodeStatus::Skipped);
            newly_skipped.push(id);
        }
    }
}

fn ready_nodes(
    graph: &Graph,
    status: &BTreeMap<NodeId, NodeStatus>,
    activated: &BTreeSet<NodeId>,
) -> Vec<NodeId> {
    activated
        .iter()
        .copied()
        .filter(|id| status.get(id) == Some(&NodeStatus::Pending))
        .filter(|id| {
            !graph.options(*id).deferred
                || graph
                    .predecessors(*id)
                    .all(|p| status.get(&p).copied().is_some_and(is_resolved))
        })
        .collect()
}

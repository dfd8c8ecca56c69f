//! Workflow graph definition and compilation.
//!
//! A `GraphBuilder` collects nodes, fixed edges and conditional edges; `compile`
//! validates the structure once and produces an immutable `Graph` that can be
//! shared by any number of concurrent runs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::State;

use super::node::{Node, NodeError, NodeId};

/// Where an edge starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Source {
    Start,
    Node(NodeId),
}

/// Where an edge ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Target {
    Node(NodeId),
    End,
}

pub const START: Source = Source::Start;
pub const END: Target = Target::End;

impl From<NodeId> for Source {
    fn from(id: NodeId) -> Self {
        Source::Node(id)
    }
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Target::Node(id)
    }
}

/// Outcome of a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    NoClaims,
    WebVerification,
    LlmVerification,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoClaims => "no_claims",
            Self::WebVerification => "web_verification",
            Self::LlmVerification => "llm_verification",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure function of the merged state choosing an outgoing branch
pub type Router = fn(&State) -> Route;

/// Errors from building or executing a graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Invalid graph: {0}")]
    Compile(String),

    #[error("Input is {actual} bytes, limit is {limit}")]
    InputTooLarge { actual: usize, limit: usize },

    #[error("Node '{node}' failed: {source}")]
    NodeFailed {
        node: NodeId,
        #[source]
        source: NodeError,
    },

    #[error("Node '{node}' timed out after {after:?}")]
    Timeout { node: NodeId, after: Duration },

    #[error("Router for '{node}' chose '{route}' which has no branch")]
    UnknownRoute { node: NodeId, route: Route },

    #[error("Run stopped before reaching the end (waiting: {waiting:?})")]
    Stalled { waiting: Vec<NodeId> },
}

/// How a node takes part in execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeOptions {
    /// Wait until every predecessor has completed or been skipped
    pub deferred: bool,

    /// Receive a token sink when the run is observed
    pub streams_tokens: bool,
}

impl NodeOptions {
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Default::default()
        }
    }

    pub fn streams_tokens(mut self) -> Self {
        self.streams_tokens = true;
        self
    }
}

#[derive(Clone)]
pub(crate) struct NodeSpec {
    pub(crate) node: Arc<dyn Node>,
    pub(crate) options: NodeOptions,
}

#[derive(Clone)]
struct ConditionalEdge {
    router: Router,
    branches: BTreeMap<Route, Target>,
}

/// Collects the graph structure before validation
#[derive(Default)]
pub struct GraphBuilder {
    name: String,
    nodes: BTreeMap<NodeId, NodeSpec>,
    edges: Vec<(Source, Target)>,
    conditional: BTreeMap<NodeId, ConditionalEdge>,
    problems: Vec<String>,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_node(mut self, id: NodeId, node: impl Node + 'static) -> Self {
        self.insert_node(id, Arc::new(node), NodeOptions::default());
        self
    }

    pub fn add_node_with(
        mut self,
        id: NodeId,
        node: impl Node + 'static,
        options: NodeOptions,
    ) -> Self {
        self.insert_node(id, Arc::new(node), options);
        self
    }

    fn insert_node(&mut self, id: NodeId, node: Arc<dyn Node>, options: NodeOptions) {
        if self.nodes.insert(id, NodeSpec { node, options }).is_some() {
            self.problems.push(format!("node '{}' added twice", id));
        }
    }

    pub fn add_edge(mut self, from: impl Into<Source>, to: impl Into<Target>) -> Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Route from `from` to one of `branches` based on `router`
    pub fn add_conditional_edges<I>(mut self, from: NodeId, router: Router, branches: I) -> Self
    where
        I: IntoIterator<Item = (Route, Target)>,
    {
        let branches: BTreeMap<Route, Target> = branches.into_iter().collect();
        if branches.is_empty() {
            self.problems
                .push(format!("conditional edge from '{}' has no branches", from));
        }
        if self
            .conditional
            .insert(from, ConditionalEdge { router, branches })
            .is_some()
        {
            self.problems
                .push(format!("node '{}' has two conditional edges", from));
        }
        self
    }

    /// Validate and freeze the graph
    pub fn compile(self) -> Result<Graph, GraphError> {
        let mut problems = self.problems;

        let known = |target: &Target| match target {
            Target::Node(id) => self.nodes.contains_key(id),
            Target::End => true,
        };

        for (from, to) in &self.edges {
            if let Source::Node(id) = from {
                if !self.nodes.contains_key(id) {
                    problems.push(format!("edge starts at unknown node '{}'", id));
                }
            }
            if !known(to) {
                problems.push(format!("edge ends at unknown node '{:?}'", to));
            }
        }
        for (from, edge) in &self.conditional {
            if !self.nodes.contains_key(from) {
                problems.push(format!("conditional edge starts at unknown node '{}'", from));
            }
            for (route, to) in &edge.branches {
                if !known(to) {
                    problems.push(format!(
                        "branch '{}' from '{}' ends at unknown node '{:?}'",
                        route, from, to
                    ));
                }
            }
        }

        let mut successors: BTreeMap<Source, BTreeSet<Target>> = BTreeMap::new();
        for (from, to) in &self.edges {
            successors.entry(*from).or_default().insert(*to);
        }
        for (from, edge) in &self.conditional {
            successors
                .entry(Source::Node(*from))
                .or_default()
                .extend(edge.branches.values().copied());
        }

        let mut predecessors: BTreeMap<NodeId, BTreeSet<NodeId>> =
            self.nodes.keys().map(|id| (*id, BTreeSet::new())).collect();
        let mut entry_reached: BTreeSet<NodeId> = BTreeSet::new();
        for (from, targets) in &successors {
            for target in targets {
                if let Target::Node(to) = target {
                    match from {
                        Source::Start => {
                            entry_reached.insert(*to);
                        }
                        Source::Node(from) => {
                            if let Some(preds) = predecessors.get_mut(to) {
                                preds.insert(*from);
                            }
                        }
                    }
                }
            }
        }

        if !successors.contains_key(&Source::Start) {
            problems.push("no edge from START".to_string());
        }
        if !successors.values().any(|targets| targets.contains(&Target::End)) {
            problems.push("no edge reaches END".to_string());
        }
        for id in self.nodes.keys() {
            let has_incoming = entry_reached.contains(id)
                || predecessors.get(id).is_some_and(|p| !p.is_empty());
            if !has_incoming {
                problems.push(format!("node '{}' is unreachable", id));
            }
            if !successors.contains_key(&Source::Node(*id)) {
                problems.push(format!("node '{}' has no outgoing edge", id));
            }
        }

        if problems.is_empty() {
            if let Some(cycle_member) = find_cycle(&self.nodes, &predecessors) {
                problems.push(format!("cycle through node '{}'", cycle_member));
            }
        }

        if !problems.is_empty() {
            return Err(GraphError::Compile(problems.join("; ")));
        }

        let entry = successors
            .get(&Source::Start)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default();

        Ok(Graph {
            name: self.name,
            nodes: self.nodes,
            entry,
            edges: self.edges,
            conditional: self.conditional,
            predecessors,
        })
    }
}

/// Kahn's algorithm; returns a node left over when the graph is cyclic
fn find_cycle(
    nodes: &BTreeMap<NodeId, NodeSpec>,
    predecessors: &BTreeMap<NodeId, BTreeSet<NodeId>>,
) -> Option<NodeId> {
    let mut remaining: BTreeMap<NodeId, usize> = predecessors
        .iter()
        .map(|(id, preds)| (*id, preds.len()))
        .collect();
    let mut queue: VecDeque<NodeId> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for (other, preds) in predecessors {
            if preds.contains(&id) {
                if let Some(count) = remaining.get_mut(other) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*other);
                    }
                }
            }
        }
    }

    if visited == nodes.len() {
        None
    } else {
        remaining
            .into_iter()
            .find(|(_, count)| *count > 0)
            .map(|(id, _)| id)
    }
}

/// A validated, immutable workflow graph
#[derive(Clone)]
pub struct Graph {
    name: String,
    nodes: BTreeMap<NodeId, NodeSpec>,
    entry: Vec<Target>,
    edges: Vec<(Source, Target)>,
    conditional: BTreeMap<NodeId, ConditionalEdge>,
    predecessors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub(crate) fn spec(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.get(&id)
    }

    pub fn options(&self, id: NodeId) -> NodeOptions {
        self.nodes
            .get(&id)
            .map(|spec| spec.options)
            .unwrap_or_default()
    }

    /// Targets of the edges leaving START
    pub fn entry(&self) -> &[Target] {
        &self.entry
    }

    /// Every node with an edge (fixed or conditional) into `id`
    pub fn predecessors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.predecessors
            .get(&id)
            .into_iter()
            .flat_map(|preds| preds.iter().copied())
    }

    /// Edges that fire once `id` has completed against `state`
    pub fn fired_edges(&self, id: NodeId, state: &State) -> Result<Vec<Target>, GraphError> {
        let mut targets: Vec<Target> = self
            .edges
            .iter()
            .filter(|(from, _)| *from == Source::Node(id))
            .map(|(_, to)| *to)
            .collect();

        if let Some(edge) = self.conditional.get(&id) {
            let route = (edge.router)(state);
            let target = edge
                .branches
                .get(&route)
                .ok_or(GraphError::UnknownRoute { node: id, route })?;
            targets.push(*target);
        }

        Ok(targets)
    }

    /// Render the graph as a Mermaid flowchart
    pub fn to_mermaid(&self) -> String {
        fn label(target: &Target) -> String {
            match target {
                Target::Node(id) => id.to_string(),
                Target::End => "__end__".to_string(),
            }
        }

        let mut out = String::from("graph TD;\n");
        out.push_str("\t__start__([<p>__start__</p>]):::first\n");
        for (id, spec) in &self.nodes {
            if spec.options.deferred {
                out.push_str(&format!("\t{}({}<hr/><small><em>defer</em></small>)\n", id, id));
            } else {
                out.push_str(&format!("\t{}({})\n", id, id));
            }
        }
        out.push_str("\t__end__([<p>__end__</p>]):::last\n");

        for (from, to) in &self.edges {
            let from = match from {
                Source::Start => "__start__".to_string(),
                Source::Node(id) => id.to_string(),
            };
            out.push_str(&format!("\t{} --> {};\n", from, label(to)));
        }
        for (from, edge) in &self.conditional {
            for (route, to) in &edge.branches {
                out.push_str(&format!("\t{} -. &nbsp;{}&nbsp; .-> {};\n", from, route, label(to)));
            }
        }

        out.push_str("\tclassDef default fill:#f2f0ff,line-height:1.2\n");
        out.push_str("\tclassDef first fill-opacity:0\n");
        out.push_str("\tclassDef last fill:#bfb6fc\n");
        out
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("edges", &self.edges)
            .finish()
    }
}

//! Stage graph and the sequential run driver.

use crate::dispatch::Dispatcher;
use crate::stages::{self, Route};
use crate::state::SupportState;
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

/// One node of the workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StageId {
    Intake,
    Understand,
    Prepare,
    Ask,
    Wait,
    Retrieve,
    Decide,
    Update,
    Create,
    Do,
    Complete,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Intake => "intake",
            StageId::Understand => "understand",
            StageId::Prepare => "prepare",
            StageId::Ask => "ask",
            StageId::Wait => "wait",
            StageId::Retrieve => "retrieve",
            StageId::Decide => "decide",
            StageId::Update => "update",
            StageId::Create => "create",
            StageId::Do => "do",
            StageId::Complete => "complete",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing edge of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Next(StageId),
    /// The router picks between the two targets.
    Fork { update: StageId, create: StageId },
    Terminal,
}

/// Directed stage graph: an entry stage plus one outgoing edge per stage.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    entry: StageId,
    edges: BTreeMap<StageId, Edge>,
}

impl WorkflowGraph {
    /// Graph with explicit wiring. Callers building one by hand should run
    /// [`WorkflowGraph::validate`] (the engine constructor does).
    pub fn new(entry: StageId, edges: BTreeMap<StageId, Edge>) -> Self {
        Self { entry, edges }
    }

    /// The support workflow: a linear chain to Decide, a fork to Update or
    /// Create, both reconverging at Do, then Complete.
    pub fn support_flow() -> Self {
        let mut edges = BTreeMap::new();
        edges.insert(StageId::Intake, Edge::Next(StageId::Understand));
        edges.insert(StageId::Understand, Edge::Next(StageId::Prepare));
        edges.insert(StageId::Prepare, Edge::Next(StageId::Ask));
        edges.insert(StageId::Ask, Edge::Next(StageId::Wait));
        edges.insert(StageId::Wait, Edge::Next(StageId::Retrieve));
        edges.insert(StageId::Retrieve, Edge::Next(StageId::Decide));
        edges.insert(
            StageId::Decide,
            Edge::Fork {
                update: StageId::Update,
                create: StageId::Create,
            },
        );
        edges.insert(StageId::Update, Edge::Next(StageId::Do));
        edges.insert(StageId::Create, Edge::Next(StageId::Do));
        edges.insert(StageId::Do, Edge::Next(StageId::Complete));
        edges.insert(StageId::Complete, Edge::Terminal);
        Self {
            entry: StageId::Intake,
            edges,
        }
    }

    pub fn entry(&self) -> StageId {
        self.entry
    }

    pub fn edge(&self, stage: StageId) -> Option<Edge> {
        self.edges.get(&stage).copied()
    }

    /// Walk every path from the entry. Each visited stage must have an
    /// outgoing edge, no stage may repeat along one path, and every edge
    /// entry must be reachable. A successful walk implies every path ends
    /// at a terminal.
    pub fn validate(&self) -> Result<()> {
        let mut reached = BTreeSet::new();
        let mut path = Vec::new();
        self.walk(self.entry, &mut path, &mut reached)?;
        for stage in self.edges.keys() {
            if !reached.contains(stage) {
                return Err(anyhow!(
                    "stage {stage} is unreachable from entry {}",
                    self.entry
                ));
            }
        }
        Ok(())
    }

    fn walk(
        &self,
        stage: StageId,
        path: &mut Vec<StageId>,
        reached: &mut BTreeSet<StageId>,
    ) -> Result<()> {
        if path.contains(&stage) {
            return Err(anyhow!("cycle through stage {stage}"));
        }
        reached.insert(stage);
        let Some(edge) = self.edge(stage) else {
            return Err(anyhow!("stage {stage} has no outgoing edge"));
        };
        path.push(stage);
        let result = match edge {
            Edge::Terminal => Ok(()),
            Edge::Next(next) => self.walk(next, path, reached),
            Edge::Fork { update, create } => self
                .walk(update, path, reached)
                .and_then(|()| self.walk(create, path, reached)),
        };
        path.pop();
        result
    }
}

/// Drives one run from the entry stage to the terminal stage.
///
/// `run` is infallible by type: every failure a provider can produce has
/// already degraded to an empty update lower down.
pub struct Engine {
    graph: WorkflowGraph,
    dispatcher: Dispatcher,
}

impl Engine {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            graph: WorkflowGraph::support_flow(),
            dispatcher,
        }
    }

    /// Engine over a custom graph; validates it first.
    pub fn with_graph(graph: WorkflowGraph, dispatcher: Dispatcher) -> Result<Self> {
        graph.validate()?;
        Ok(Self { graph, dispatcher })
    }

    pub fn run(&self, input: SupportState) -> SupportState {
        let start = Instant::now();
        let mut state = input;
        let mut stage = self.graph.entry();
        loop {
            let update = stages::run_stage(stage, &self.dispatcher, &mut state);
            state.apply(update);
            tracing::debug!(stage = %stage, "stage committed");
            match self.graph.edge(stage) {
                None => {
                    // Only a hand-built, unvalidated graph can get here.
                    state.log(format!("Engine: no edge out of {stage}; ending run."));
                    break;
                }
                Some(Edge::Terminal) => break,
                Some(Edge::Next(next)) => stage = next,
                Some(Edge::Fork { update: low, create: high }) => {
                    stage = match stages::decide_route(&self.dispatcher, &mut state) {
                        Route::Update => low,
                        Route::Create => high,
                    };
                }
            }
        }
        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            log_lines = state.logs.len(),
            "run complete"
        );
        state
    }
}

//! Graph execution engine.
//!
//! `GraphExecutor` drives one run:
//! 1. Starts at the entry node with a transition count of 0.
//! 2. Halts immediately on the end marker, returning the state untouched.
//! 3. Invokes the current node with the state and replaces the state with
//!    the node's output. Exactly one node runs at a time.
//! 4. Halts if the node has no successor.
//! 5. Otherwise takes the first candidate successor, unless the transition
//!    count has already reached the loop ceiling, in which case the state is
//!    flagged `loop_limit_reached` and the run halts.
//!
//! A node that returns an error aborts the run; the error reaches the caller
//! unchanged inside [`EngineError::NodeFailed`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use nodes::{ExecutionContext, State};

use crate::graph::{self, EdgeTable, NodeRegistry, END};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Output of a completed run
// ---------------------------------------------------------------------------

/// Which terminal condition ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Halt {
    /// The end marker was reached.
    End,
    /// The last node had no successor.
    NoEdge,
    /// The loop ceiling cut the run short.
    LoopLimit,
}

/// The result of running a graph to a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    /// State as returned by the last node.
    pub state: State,
    pub halt: Halt,
    /// Every node invoked, in order.
    pub path: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    /// True when the loop ceiling, not the graph, ended the run.
    pub fn truncated(&self) -> bool {
        self.halt == Halt::LoopLimit
    }

    pub fn invocations(&self) -> usize {
        self.path.len()
    }
}

// ---------------------------------------------------------------------------
// GraphExecutor
// ---------------------------------------------------------------------------

/// A validated graph, ready to run any number of times.
///
/// Each call to [`GraphExecutor::run`] owns its own state, so one executor
/// can serve concurrent runs as long as its nodes don't share mutable
/// resources outside the state.
pub struct GraphExecutor {
    nodes: NodeRegistry,
    edges: EdgeTable,
    entry: String,
    loop_ceiling: usize,
}

impl std::fmt::Debug for GraphExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        f.debug_struct("GraphExecutor")
            .field("nodes", &names)
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .field("loop_ceiling", &self.loop_ceiling)
            .finish()
    }
}

impl GraphExecutor {
    /// Validate and assemble a graph.
    ///
    /// # Errors
    /// Any configuration error from [`graph::validate_graph`].
    pub fn new(
        nodes: NodeRegistry,
        edges: EdgeTable,
        entry: impl Into<String>,
        loop_ceiling: usize,
    ) -> Result<Self, EngineError> {
        let entry = entry.into();
        graph::validate_graph(&nodes, &edges, &entry, loop_ceiling)?;
        Ok(Self {
            nodes,
            edges,
            entry,
            loop_ceiling,
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn loop_ceiling(&self) -> usize {
        self.loop_ceiling
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Run the graph from its entry node.
    ///
    /// # Errors
    /// Only [`EngineError::NodeFailed`] when a node escalates; hitting the
    /// loop ceiling is reported through [`RunOutcome::halt`], not as an error.
    #[instrument(skip(self, initial_state), fields(run_id = tracing::field::Empty, entry = %self.entry))]
    pub async fn run(&self, initial_state: State) -> Result<RunOutcome, EngineError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let started_at = Utc::now();
        info!(loop_ceiling = self.loop_ceiling, "run started");
        let mut path = Vec::new();
        let (state, halt) = self.drive(run_id, initial_state, &mut path).await?;

        info!(?halt, invocations = path.len(), "run finished");
        Ok(RunOutcome {
            run_id,
            state,
            halt,
            path,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// The step loop. Appends each invoked node to `path`.
    pub(crate) async fn drive(
        &self,
        run_id: Uuid,
        mut state: State,
        path: &mut Vec<String>,
    ) -> Result<(State, Halt), EngineError> {
        let mut current = self.entry.clone();
        let mut transitions = 0usize;

        loop {
            if current == END {
                return Ok((state, Halt::End));
            }

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| EngineError::UnknownNode(current.clone()))?;

            let ctx = ExecutionContext {
                run_id,
                node_id: current.clone(),
                step: transitions,
            };
            debug!(node = %current, step = transitions, "invoking node");

            // Reported with the error if the node escalates.
            let snapshot = state.clone();
            path.push(current.clone());
            state = match node.execute(state, &ctx).await {
                Ok(next) => next,
                Err(source) => {
                    error!(node = %current, error = %source, "node escalated, aborting run");
                    return Err(EngineError::NodeFailed {
                        node_id: current,
                        state: Box::new(snapshot),
                        source,
                    });
                }
            };

            let Some(next) = graph::successor(&self.edges, &current) else {
                return Ok((state, Halt::NoEdge));
            };

            if transitions >= self.loop_ceiling {
                warn!(
                    node = %current,
                    loop_ceiling = self.loop_ceiling,
                    "loop ceiling reached, halting"
                );
                state.mark_loop_limit_reached();
                return Ok((state, Halt::LoopLimit));
            }

            current = next.to_owned();
            transitions += 1;
        }
    }
}

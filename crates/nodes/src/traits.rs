//! The `ExecutableNode` trait — the contract every node must fulfil.

use async_trait::async_trait;

use crate::{NodeError, State};

/// Per-step context passed to every node.
///
/// Defined here (in the nodes crate) so both the engine and individual node
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the current run.
    pub run_id: uuid::Uuid,
    /// Name the node is registered under in the running graph.
    pub node_id: String,
    /// Number of transitions taken before this invocation.
    pub step: usize,
}

impl ExecutionContext {
    /// Context for calling a node outside of a graph run.
    pub fn detached(node_id: impl Into<String>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4(),
            node_id: node_id.into(),
            step: 0,
        }
    }
}

/// The core node trait.
///
/// A node receives the current state and returns the next one. It may add,
/// overwrite or remove fields, but should leave fields it does not understand
/// alone so independently written nodes compose. The executor awaits each
/// call to completion before choosing a successor.
#[async_trait]
pub trait ExecutableNode: Send + Sync {
    async fn execute(&self, state: State, ctx: &ExecutionContext) -> Result<State, NodeError>;
}

//! `FnNode` — adapt a plain closure into an `ExecutableNode`.

use async_trait::async_trait;

use crate::{traits::ExecutionContext, ExecutableNode, NodeError, State};

/// A node backed by a synchronous closure over the state.
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(State) -> Result<State, NodeError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

/// Shorthand for a closure that cannot fail.
pub fn infallible<F>(f: F) -> FnNode<impl Fn(State) -> Result<State, NodeError> + Send + Sync>
where
    F: Fn(State) -> State + Send + Sync,
{
    FnNode::new(move |state| Ok(f(state)))
}

#[async_trait]
impl<F> ExecutableNode for FnNode<F>
where
    F: Fn(State) -> Result<State, NodeError> + Send + Sync,
{
    async fn execute(&self, state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        (self.f)(state)
    }
}

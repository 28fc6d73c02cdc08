//! `MockNode` — a test double for `ExecutableNode`.
//!
//! Useful in unit and integration tests where a real node implementation is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::{traits::ExecutionContext, ExecutableNode, NodeError, State};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Merge the given fields into the incoming state.
    Merge(State),
    /// Replace the whole state with the given record.
    Replace(State),
    /// Fail with a `Fatal` error.
    FailFatal(String),
}

/// A mock node that records every state it receives and returns a
/// programmer-specified result.
pub struct MockNode {
    /// Label used in test assertions; also written to the `last_node` field.
    pub name: String,
    /// What the node will do when `execute` is called.
    pub behaviour: MockBehaviour,
    /// All states seen by this node (in call order).
    pub calls: Arc<Mutex<Vec<State>>>,
}

impl MockNode {
    fn with(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that passes the state through, stamping `last_node`.
    pub fn passthrough(name: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::Merge(State::new()))
    }

    /// Create a mock that merges `fields` into every state it sees.
    pub fn merging<K, V>(name: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::with(name, MockBehaviour::Merge(fields.into_iter().collect()))
    }

    /// Create a mock that discards its input and returns `state` verbatim.
    pub fn replacing(name: impl Into<String>, state: State) -> Self {
        Self::with(name, MockBehaviour::Replace(state))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with(name, MockBehaviour::FailFatal(msg.into()))
    }

    /// Number of times this node has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Copy of every state handed to this node.
    pub fn seen(&self) -> Vec<State> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutableNode for MockNode {
    async fn execute(&self, state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        self.calls.lock().unwrap().push(state.clone());

        match &self.behaviour {
            MockBehaviour::Merge(fields) => {
                // Stamp the node name so tests can trace the data flowing
                // through the graph.
                let mut out = state;
                out.merge(fields.clone());
                out.insert("last_node", self.name.clone());
                Ok(out)
            }
            MockBehaviour::Replace(replacement) => Ok(replacement.clone()),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn merging_mock_keeps_input_fields() {
        let node = MockNode::merging("answer", [("answer", json!("42"))]);
        let input: State = [("question", json!("?"))].into_iter().collect();

        let out = node
            .execute(input.clone(), &ExecutionContext::detached("answer"))
            .await
            .unwrap();

        assert_eq!(out.get_str("question"), Some("?"));
        assert_eq!(out.get_str("answer"), Some("42"));
        assert_eq!(out.get_str("last_node"), Some("answer"));
        assert_eq!(node.seen(), vec![input]);
    }

    #[tokio::test]
    async fn failing_mock_still_records_the_call() {
        let node = MockNode::failing_fatal("boom", "nope");
        let result = node
            .execute(State::new(), &ExecutionContext::detached("boom"))
            .await;
        assert!(matches!(result, Err(NodeError::Fatal(_))));
        assert_eq!(node.call_count(), 1);
    }
}

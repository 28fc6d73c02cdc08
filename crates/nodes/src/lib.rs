//! `nodes` crate — the node contract, the state record, and built-in nodes.
//!
//! Every node, built-in or user-supplied, implements [`ExecutableNode`].
//! The engine crate drives a graph by dispatching through this trait object.

pub mod builtin;
pub mod error;
pub mod fn_node;
pub mod llm;
pub mod math;
pub mod mock;
pub mod retrieval;
pub mod state;
pub mod traits;

pub use error::NodeError;
pub use fn_node::FnNode;
pub use state::State;
pub use traits::{ExecutableNode, ExecutionContext};

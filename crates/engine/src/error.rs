//! Engine-level error types.

use nodes::{NodeError, State};
use thiserror::Error;

/// Errors produced by the graph engine.
///
/// Everything except [`EngineError::NodeFailed`] is a configuration error
/// raised while a graph is being assembled, before any node runs.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Construction errors ------

    /// Two node definitions share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A node was registered under the end marker's name.
    #[error("'{0}' is reserved for the end marker")]
    ReservedNodeName(String),

    /// The entry point is neither a registered node nor the end marker.
    #[error("entry node '{0}' is not registered")]
    UnknownEntry(String),

    /// An edge references a node ID that isn't registered.
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference {
        node_id: String,
        side: &'static str,
    },

    /// A definition names a node type the catalog doesn't provide.
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    #[error("loop ceiling must be at least 1")]
    InvalidLoopCeiling,

    /// A refinement loop was built without one of its roles.
    #[error("refinement loop has no {0} node")]
    MissingRole(&'static str),

    /// A node name fills more than one slot of a refinement loop.
    #[error("node '{0}' appears more than once in the refinement loop")]
    RepeatedRole(String),

    // ------ Run errors ------

    /// The step loop landed on a node missing from the registry. Construction
    /// validates every entry and successor, so a validated executor never
    /// returns this.
    #[error("no node registered as '{0}'")]
    UnknownNode(String),

    /// A node escalated instead of recording its failure in the state.
    /// `state` is what the node was handed.
    #[error("node '{node_id}' failed: {source}")]
    NodeFailed {
        node_id: String,
        state: Box<State>,
        #[source]
        source: NodeError,
    },
}

impl EngineError {
    /// True for errors detected while assembling a graph.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, EngineError::NodeFailed { .. })
    }
}

//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node's `execute` method.
///
/// Returning an error escalates: the engine stops the run and hands the error
/// to its caller unchanged. Failures a graph is expected to cope with belong
/// in the state instead (see [`crate::state::ERROR`]).
#[derive(Debug, Error)]
pub enum NodeError {
    /// Permanent failure; the run is aborted.
    #[error("fatal node error: {0}")]
    Fatal(String),

    /// An external dependency the node cannot work without is down.
    #[error("dependency '{dependency}' unavailable: {message}")]
    Dependency {
        dependency: String,
        message: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

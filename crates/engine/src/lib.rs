//! `engine` crate — graph validation, the step-loop executor, and the
//! bounded-refinement loop built on top of it.

pub mod agent;
pub mod error;
pub mod executor;
pub mod graph;
pub mod models;
pub mod refine;

pub use error::EngineError;
pub use executor::{GraphExecutor, Halt, RunOutcome};
pub use graph::{EdgeTable, NodeRegistry, END};
pub use models::{Edge, GraphDefinition, NodeDefinition};
pub use refine::{BoundedRefinement, RefinementOutcome};

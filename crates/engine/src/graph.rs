//! Graph tables and construction-time validation.
//!
//! Rules enforced before any run starts:
//! 1. The loop ceiling is at least 1.
//! 2. No node is registered under the end marker's name.
//! 3. The entry is a registered node or the end marker.
//! 4. Every edge source is a registered node; every target is a registered
//!    node or the end marker.
//!
//! Cycles are allowed: termination comes from the loop ceiling, not from the
//! shape of the graph.

use std::collections::HashMap;
use std::sync::Arc;

use nodes::ExecutableNode;

use crate::EngineError;

/// Reserved successor name meaning "halt normally".
pub const END: &str = "__END__";

/// Maps node names to their implementations.
pub type NodeRegistry = HashMap<String, Arc<dyn ExecutableNode>>;

/// Maps node names to their ordered candidate successors. A missing or empty
/// entry means "halt after this node".
pub type EdgeTable = HashMap<String, Vec<String>>;

/// Check a graph against the rules above.
///
/// # Errors
/// - [`EngineError::InvalidLoopCeiling`] if `loop_ceiling` is 0.
/// - [`EngineError::ReservedNodeName`] if a node is named [`END`].
/// - [`EngineError::UnknownEntry`] if `entry` is not registered.
/// - [`EngineError::UnknownNodeReference`] if an edge points at a missing node.
pub fn validate_graph(
    nodes: &NodeRegistry,
    edges: &EdgeTable,
    entry: &str,
    loop_ceiling: usize,
) -> Result<(), EngineError> {
    if loop_ceiling == 0 {
        return Err(EngineError::InvalidLoopCeiling);
    }

    if nodes.contains_key(END) {
        return Err(EngineError::ReservedNodeName(END.to_owned()));
    }

    if entry != END && !nodes.contains_key(entry) {
        return Err(EngineError::UnknownEntry(entry.to_owned()));
    }

    // Walk sources in name order so the reported error is deterministic.
    let mut sources: Vec<&String> = edges.keys().collect();
    sources.sort();

    for from in sources {
        if !nodes.contains_key(from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: from.clone(),
                side: "from",
            });
        }
        for to in &edges[from] {
            if to != END && !nodes.contains_key(to.as_str()) {
                return Err(EngineError::UnknownNodeReference {
                    node_id: to.clone(),
                    side: "to",
                });
            }
        }
    }

    Ok(())
}

/// First candidate successor of `node`, if any.
///
/// Multiple candidates are resolved by position: the executor never inspects
/// the state to choose between them.
pub fn successor<'a>(edges: &'a EdgeTable, node: &str) -> Option<&'a str> {
    edges
        .get(node)
        .and_then(|candidates| candidates.first())
        .map(String::as_str)
}

/// Edge table for the straight line `names[0] → names[1] → … → END`.
pub fn chain(names: &[&str]) -> EdgeTable {
    names
        .iter()
        .enumerate()
        .map(|(i, from)| {
            let to = names.get(i + 1).copied().unwrap_or(END);
            (from.to_string(), vec![to.to_owned()])
        })
        .collect()
}

//! Serializable graph definitions.
//!
//! A definition names its nodes by type; building it against a catalog of
//! implementations yields a validated [`GraphExecutor`]. The JSON shape:
//!
//! ```json
//! {
//!   "name": "summarize",
//!   "entry": "read",
//!   "loop_ceiling": 3,
//!   "nodes": [{ "id": "read", "node_type": "read_input" }],
//!   "edges": [{ "from": "read", "to": "__END__" }]
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use nodes::ExecutableNode;

use crate::executor::GraphExecutor;
use crate::graph::{EdgeTable, NodeRegistry};
use crate::EngineError;

pub const DEFAULT_LOOP_CEILING: usize = 3;

fn default_loop_ceiling() -> usize {
    DEFAULT_LOOP_CEILING
}

// ---------------------------------------------------------------------------
// NodeDefinition
// ---------------------------------------------------------------------------

/// A single step in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    /// Key into the node catalog.
    pub node_type: String,
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge from one node to another (or to `__END__`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

// ---------------------------------------------------------------------------
// GraphDefinition
// ---------------------------------------------------------------------------

/// A complete graph definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub name: String,
    pub entry: String,
    #[serde(default = "default_loop_ceiling")]
    pub loop_ceiling: usize,
    pub nodes: Vec<NodeDefinition>,
    /// Order matters: for a node with several outgoing edges the first one
    /// listed is taken.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDefinition {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Ordered candidate successors per node.
    pub fn edge_table(&self) -> EdgeTable {
        let mut table = EdgeTable::new();
        for edge in &self.edges {
            table
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
        }
        table
    }

    /// Resolve node types against `catalog` and validate the result.
    ///
    /// # Errors
    /// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
    /// - [`EngineError::UnknownNodeType`] if a type is missing from `catalog`.
    /// - Any error from [`GraphExecutor::new`].
    pub fn build(
        &self,
        catalog: &HashMap<String, Arc<dyn ExecutableNode>>,
    ) -> Result<GraphExecutor, EngineError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut registry = NodeRegistry::new();

        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(EngineError::DuplicateNodeId(node.id.clone()));
            }
            let implementation =
                catalog
                    .get(&node.node_type)
                    .ok_or_else(|| EngineError::UnknownNodeType {
                        node_id: node.id.clone(),
                        node_type: node.node_type.clone(),
                    })?;
            registry.insert(node.id.clone(), Arc::clone(implementation));
        }

        GraphExecutor::new(registry, self.edge_table(), self.entry.clone(), self.loop_ceiling)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::END;
    use nodes::mock::MockNode;

    fn catalog() -> HashMap<String, Arc<dyn ExecutableNode>> {
        let mut c: HashMap<String, Arc<dyn ExecutableNode>> = HashMap::new();
        c.insert("mock".into(), Arc::new(MockNode::passthrough("mock")));
        c
    }

    fn node(id: &str, node_type: &str) -> NodeDefinition {
        NodeDefinition { id: id.into(), node_type: node_type.into() }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge { from: from.into(), to: to.into() }
    }

    #[test]
    fn parses_json_with_default_ceiling() {
        let def = GraphDefinition::from_json(
            r#"{
                "name": "demo",
                "entry": "a",
                "nodes": [{ "id": "a", "node_type": "mock" }],
                "edges": [{ "from": "a", "to": "__END__" }]
            }"#,
        )
        .expect("valid json");
        assert_eq!(def.loop_ceiling, DEFAULT_LOOP_CEILING);
        assert_eq!(def.edges, vec![edge("a", END)]);
        assert!(def.build(&catalog()).is_ok());
    }

    #[test]
    fn edge_order_is_candidate_order() {
        let def = GraphDefinition {
            name: "t".into(),
            entry: "a".into(),
            loop_ceiling: 1,
            nodes: vec![node("a", "mock"), node("b", "mock"), node("c", "mock")],
            edges: vec![edge("a", "c"), edge("a", "b")],
        };
        assert_eq!(def.edge_table()["a"], vec!["c".to_string(), "b".to_string()]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let def = GraphDefinition {
            name: "t".into(),
            entry: "a".into(),
            loop_ceiling: 1,
            nodes: vec![node("a", "mock"), node("a", "mock")],
            edges: vec![],
        };
        assert!(matches!(
            def.build(&catalog()),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn unknown_node_type_is_rejected() {
        let def = GraphDefinition {
            name: "t".into(),
            entry: "a".into(),
            loop_ceiling: 1,
            nodes: vec![node("a", "teleport")],
            edges: vec![],
        };
        assert!(matches!(
            def.build(&catalog()),
            Err(EngineError::UnknownNodeType { node_type, .. }) if node_type == "teleport"
        ));
    }

    #[test]
    fn shipped_graphs_build_against_builtin_catalog() {
        use nodes::builtin;
        use nodes::llm::FakeLlm;
        use nodes::retrieval::KeywordRetriever;

        let catalog = builtin::catalog(Arc::new(FakeLlm), Arc::new(KeywordRetriever::demo()));
        for text in [
            include_str!("../../../graphs/summarize.json"),
            include_str!("../../../graphs/rag.json"),
        ] {
            let def = GraphDefinition::from_json(text).expect("shipped graph parses");
            assert!(def.build(&catalog).is_ok(), "{} does not build", def.name);
        }
    }

    #[tokio::test]
    async fn self_loop_definition_stops_at_its_ceiling() {
        use nodes::builtin;
        use nodes::llm::FakeLlm;
        use nodes::retrieval::KeywordRetriever;

        let catalog = builtin::catalog(Arc::new(FakeLlm), Arc::new(KeywordRetriever::demo()));
        let exec = GraphDefinition::from_json(
            r#"{
                "name": "enrich_forever",
                "entry": "enrich",
                "loop_ceiling": 2,
                "nodes": [{ "id": "enrich", "node_type": "enrich" }],
                "edges": [{ "from": "enrich", "to": "enrich" }]
            }"#,
        )
        .unwrap()
        .build(&catalog)
        .unwrap();

        let outcome = exec
            .run([("summary", "s")].into_iter().collect())
            .await
            .unwrap();

        assert!(outcome.truncated());
        assert_eq!(outcome.invocations(), 3);
        assert_eq!(
            outcome.state.get_str("summary"),
            Some("s [enriched] [enriched] [enriched]")
        );
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let def = GraphDefinition {
            name: "t".into(),
            entry: "a".into(),
            loop_ceiling: 1,
            nodes: vec![node("a", "mock")],
            edges: vec![edge("a", "b")],
        };
        assert!(matches!(
            def.build(&catalog()),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "b"
        ));
    }
}

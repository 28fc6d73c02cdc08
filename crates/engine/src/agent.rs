//! Math-or-model question answering.
//!
//! The route is decided before any graph runs: if the query parses as a
//! binary arithmetic expression the agent installs `math → END`, otherwise
//! `llm → END`. Both graphs write `answer`; failures land in `error`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use nodes::builtin::LlmNode;
use nodes::llm::LlmClient;
use nodes::math::{is_math_query, parse_math_expression, MathNode};
use nodes::State;

use crate::executor::{GraphExecutor, RunOutcome};
use crate::graph::{self, NodeRegistry};
use crate::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Evaluated locally by the arithmetic tool.
    Math,
    /// Forwarded to the language model.
    Llm,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Math => "math",
            Route::Llm => "llm",
        }
    }
}

/// Pick a route for `query`.
///
/// Text that looks like math but does not parse cleanly goes to the model.
pub fn route(query: &str) -> Route {
    if is_math_query(query) && parse_math_expression(query).is_some() {
        Route::Math
    } else {
        Route::Llm
    }
}

/// Answers one query per run through a route-specific graph.
pub struct MathAgent {
    llm: Arc<dyn LlmClient>,
}

impl MathAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Build the graph for `route`.
    pub fn executor_for(&self, route: Route) -> Result<GraphExecutor, EngineError> {
        let mut nodes = NodeRegistry::new();
        let name = match route {
            Route::Math => {
                nodes.insert("math".into(), Arc::new(MathNode));
                "math"
            }
            Route::Llm => {
                let node = LlmNode::new(self.llm.clone(), "input_text", "answer");
                nodes.insert("llm".into(), Arc::new(node));
                "llm"
            }
        };
        GraphExecutor::new(nodes, graph::chain(&[name]), name, 1)
    }

    /// Route and answer `query`. The outcome's state holds `input_text`,
    /// `route`, and either `answer` or `error`.
    #[instrument(skip(self))]
    pub async fn ask(&self, query: &str) -> Result<RunOutcome, EngineError> {
        let route = route(query);
        info!(?route, "query routed");

        let mut state = State::new();
        state.insert("input_text", query);
        state.insert("route", route.as_str());

        self.executor_for(route)?.run(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::llm::{FailingLlm, StaticLlm};

    #[test]
    fn route_names_match_serialized_form() {
        for route in [Route::Math, Route::Llm] {
            assert_eq!(serde_json::to_value(route).unwrap(), route.as_str());
        }
    }

    #[test]
    fn routes_by_parseability() {
        assert_eq!(route("10 - 4"), Route::Math);
        assert_eq!(route("what is 5 plus 3"), Route::Math);
        assert_eq!(route("Explain LangGraph."), Route::Llm);
    }

    #[tokio::test]
    async fn math_queries_never_touch_the_model() {
        let agent = MathAgent::new(Arc::new(FailingLlm));
        let outcome = agent.ask("divide 8 by 2").await.unwrap();
        assert_eq!(outcome.path, vec!["math"]);
        assert_eq!(outcome.state.get_str("answer"), Some("8 / 2 = 4 (computed via tool)"));
        assert_eq!(outcome.state.get_str("route"), Some("math"));
    }

    #[tokio::test]
    async fn other_queries_go_to_the_model() {
        let agent = MathAgent::new(Arc::new(StaticLlm("a graph library".into())));
        let outcome = agent.ask("What is LangGraph?").await.unwrap();
        assert_eq!(outcome.path, vec!["llm"]);
        assert_eq!(outcome.state.get_str("answer"), Some("a graph library"));
        assert_eq!(outcome.state.get_str("route"), Some("llm"));
    }

    #[tokio::test]
    async fn model_outage_is_reported_in_state() {
        let agent = MathAgent::new(Arc::new(FailingLlm));
        let outcome = agent.ask("tell me a joke").await.expect("not escalated");
        assert!(outcome.state.error().is_some());
        assert!(!outcome.truncated());
    }
}

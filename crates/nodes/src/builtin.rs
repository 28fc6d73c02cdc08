//! Built-in nodes for summarize, RAG and math graphs.
//!
//! Heavy dependencies (model client, retriever) are handed in at
//! construction; no node reaches for a process-wide instance. Nodes that call
//! a model record its failure under `error` instead of aborting the run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::llm::LlmClient;
use crate::math::MathNode;
use crate::retrieval::Retriever;
use crate::state::VALID;
use crate::{traits::ExecutionContext, ExecutableNode, NodeError, State};

pub const DEFAULT_INPUT: &str = "This is a demo document about LangGraph.";
pub const DEFAULT_TOP_K: usize = 2;
pub const ENRICH_SUFFIX: &str = " [enriched]";
/// Summaries shorter than this are rejected by `validate_summary`.
pub const MIN_SUMMARY_CHARS: usize = 20;

/// Every built-in node keyed by its node type.
pub fn catalog(
    llm: Arc<dyn LlmClient>,
    retriever: Arc<dyn Retriever>,
) -> HashMap<String, Arc<dyn ExecutableNode>> {
    let mut nodes: HashMap<String, Arc<dyn ExecutableNode>> = HashMap::new();
    nodes.insert("read_input".into(), Arc::new(ReadInput::new(DEFAULT_INPUT)));
    nodes.insert("summarize".into(), Arc::new(Summarize::new(llm.clone())));
    nodes.insert(
        "validate_summary".into(),
        Arc::new(ValidateField::min_chars("summary", MIN_SUMMARY_CHARS)),
    );
    nodes.insert("enrich".into(), Arc::new(Enrich::new("summary")));
    nodes.insert("finalize".into(), Arc::new(Finalize));
    nodes.insert("retrieve".into(), Arc::new(Retrieve::new(retriever, DEFAULT_TOP_K)));
    nodes.insert("rag_answer".into(), Arc::new(RagAnswer::new(llm.clone())));
    nodes.insert(
        "validate_answer".into(),
        Arc::new(ValidateField::containing("answer", "LangGraph")),
    );
    nodes.insert("widen_retrieval".into(), Arc::new(WidenRetrieval::new(DEFAULT_TOP_K)));
    nodes.insert("math".into(), Arc::new(MathNode));
    nodes.insert("llm".into(), Arc::new(LlmNode::new(llm, "input_text", "answer")));
    nodes
}

fn input_text(state: &State) -> String {
    state.get_str("input_text").unwrap_or_default().to_owned()
}

/// Seeds `input_text` when the caller did not supply one.
pub struct ReadInput {
    default_text: String,
}

impl ReadInput {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self { default_text: default_text.into() }
    }
}

#[async_trait]
impl ExecutableNode for ReadInput {
    async fn execute(&self, mut state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        if !state.contains("input_text") {
            state.insert("input_text", self.default_text.clone());
        }
        Ok(state)
    }
}

/// Asks the model for a summary of `input_text`.
pub struct Summarize {
    llm: Arc<dyn LlmClient>,
}

impl Summarize {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ExecutableNode for Summarize {
    async fn execute(&self, mut state: State, ctx: &ExecutionContext) -> Result<State, NodeError> {
        let prompt = format!("Summarize: {}", input_text(&state));
        match self.llm.generate(&prompt).await {
            Ok(summary) => {
                state.insert("summary", summary);
            }
            Err(e) => {
                warn!(node = %ctx.node_id, error = %e, "summary unavailable");
                state.set_error(e.to_string());
            }
        }
        Ok(state)
    }
}

/// Appends a marker to a text field.
pub struct Enrich {
    field: String,
}

impl Enrich {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

#[async_trait]
impl ExecutableNode for Enrich {
    async fn execute(&self, mut state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        let current = state.get_str(&self.field).unwrap_or_default().to_owned();
        state.insert(self.field.clone(), current + ENRICH_SUFFIX);
        Ok(state)
    }
}

/// Replaces the whole record with `{ "final_result": <summary> }`.
pub struct Finalize;

#[async_trait]
impl ExecutableNode for Finalize {
    async fn execute(&self, state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        let result = state.get_str("summary").unwrap_or("(no result)").to_owned();
        Ok([("final_result", result)].into_iter().collect())
    }
}

/// Stores the top `top_k` documents for `input_text` under `docs`.
///
/// A `top_k` field in the state overrides the node's default.
pub struct Retrieve {
    retriever: Arc<dyn Retriever>,
    default_k: usize,
}

impl Retrieve {
    pub fn new(retriever: Arc<dyn Retriever>, default_k: usize) -> Self {
        Self { retriever, default_k }
    }
}

#[async_trait]
impl ExecutableNode for Retrieve {
    async fn execute(&self, mut state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        let k = state
            .get_u64("top_k")
            .map(|k| k as usize)
            .unwrap_or(self.default_k);
        let docs = self.retriever.retrieve(&input_text(&state), k);
        let docs = serde_json::to_value(docs).map_err(anyhow::Error::from)?;
        state.insert("docs", docs);
        Ok(state)
    }
}

/// Answers `input_text` from the retrieved `docs`.
pub struct RagAnswer {
    llm: Arc<dyn LlmClient>,
}

impl RagAnswer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ExecutableNode for RagAnswer {
    async fn execute(&self, mut state: State, ctx: &ExecutionContext) -> Result<State, NodeError> {
        let context = state
            .get("docs")
            .and_then(Value::as_array)
            .map(|docs| {
                docs.iter()
                    .filter_map(|d| d.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        let prompt = format!("Use context:\n{context}\nQuestion: {}", input_text(&state));

        match self.llm.generate(&prompt).await {
            Ok(answer) => {
                state.insert("answer", answer);
            }
            Err(e) => {
                warn!(node = %ctx.node_id, error = %e, "answer unavailable");
                state.set_error(e.to_string());
            }
        }
        Ok(state)
    }
}

/// Sets `valid` from a check over one text field.
pub struct ValidateField {
    field: String,
    must_contain: Option<String>,
    min_chars: usize,
}

impl ValidateField {
    /// Valid when the field contains `needle`.
    pub fn containing(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            must_contain: Some(needle.into()),
            min_chars: 0,
        }
    }

    /// Valid when the field has at least `min_chars` characters.
    pub fn min_chars(field: impl Into<String>, min_chars: usize) -> Self {
        Self {
            field: field.into(),
            must_contain: None,
            min_chars,
        }
    }
}

#[async_trait]
impl ExecutableNode for ValidateField {
    async fn execute(&self, mut state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        let valid = match state.get_str(&self.field) {
            Some(text) => {
                text.chars().count() >= self.min_chars
                    && self.must_contain.as_deref().map_or(true, |n| text.contains(n))
            }
            None => false,
        };
        state.insert(VALID, valid);
        Ok(state)
    }
}

/// Remediation for RAG loops: asks the next retrieval for one more document.
pub struct WidenRetrieval {
    default_k: usize,
}

impl WidenRetrieval {
    pub fn new(default_k: usize) -> Self {
        Self { default_k }
    }
}

#[async_trait]
impl ExecutableNode for WidenRetrieval {
    async fn execute(&self, mut state: State, _ctx: &ExecutionContext) -> Result<State, NodeError> {
        let k = state.get_u64("top_k").unwrap_or(self.default_k as u64);
        state.insert("top_k", k + 1);
        Ok(state)
    }
}

/// Sends one state field to the model and stores the reply in another.
pub struct LlmNode {
    llm: Arc<dyn LlmClient>,
    prompt_field: String,
    output_field: String,
}

impl LlmNode {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompt_field: impl Into<String>,
        output_field: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            prompt_field: prompt_field.into(),
            output_field: output_field.into(),
        }
    }
}

#[async_trait]
impl ExecutableNode for LlmNode {
    async fn execute(&self, mut state: State, ctx: &ExecutionContext) -> Result<State, NodeError> {
        let prompt = state.get_str(&self.prompt_field).unwrap_or_default().to_owned();
        match self.llm.generate(&prompt).await {
            Ok(reply) => {
                state.insert(self.output_field.clone(), reply);
            }
            Err(e) => {
                warn!(node = %ctx.node_id, error = %e, "model call failed");
                state.set_error(format!("LLM call failed: {e}"));
            }
        }
        Ok(state)
    }
}

//! Bounded refinement: produce, validate, and remediate until the result is
//! valid or the refinement budget runs out.
//!
//! The loop is assembled from fixed graphs chosen between passes:
//!
//! ```text
//! initial pass      produce… → validate → END
//! remediation pass  remediate → produce… → validate → END
//! finalize pass     finalize → END            (optional, on acceptance)
//! ```
//!
//! After each pass the predicate is checked against the state, and the next
//! graph to install is picked from that. No executor ever branches at run
//! time. With `max_refinements = n` at most `n` remediation passes run, so a
//! predicate that is never satisfied still terminates with the last produced
//! state flagged `loop_limit_reached`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use nodes::State;

use crate::executor::{GraphExecutor, Halt, RunOutcome};
use crate::graph::{self, NodeRegistry};
use crate::EngineError;

/// Decides whether a state is acceptable.
pub type Predicate = Arc<dyn Fn(&State) -> bool + Send + Sync>;

/// Result of a refinement loop.
#[derive(Debug, Clone, Serialize)]
pub struct RefinementOutcome {
    #[serde(flatten)]
    pub run: RunOutcome,
    /// Remediation passes that ran.
    pub refinements: usize,
}

impl RefinementOutcome {
    /// True when the predicate was satisfied within budget.
    pub fn accepted(&self) -> bool {
        self.run.halt == Halt::End
    }
}

/// A produce/validate/remediate loop with a hard remediation budget.
pub struct BoundedRefinement {
    initial: GraphExecutor,
    remediation: GraphExecutor,
    finalize: Option<GraphExecutor>,
    predicate: Predicate,
    max_refinements: usize,
}

impl std::fmt::Debug for BoundedRefinement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedRefinement")
            .field("initial", &self.initial)
            .field("remediation", &self.remediation)
            .field("finalize", &self.finalize)
            .field("max_refinements", &self.max_refinements)
            .finish_non_exhaustive()
    }
}

impl BoundedRefinement {
    pub fn builder(nodes: NodeRegistry) -> RefinementBuilder {
        RefinementBuilder {
            nodes,
            produce: Vec::new(),
            validate: None,
            remediate: None,
            finalize: None,
            max_refinements: 2,
            predicate: Arc::new(State::is_valid),
        }
    }

    pub fn max_refinements(&self) -> usize {
        self.max_refinements
    }

    /// Run the loop to acceptance or exhaustion.
    ///
    /// # Errors
    /// Only [`EngineError::NodeFailed`] when a node escalates.
    #[instrument(skip(self, initial_state), fields(run_id = tracing::field::Empty))]
    pub async fn run(&self, initial_state: State) -> Result<RefinementOutcome, EngineError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let started_at = Utc::now();
        let mut path = Vec::new();
        let mut refinements = 0usize;

        let (mut state, _) = self.initial.drive(run_id, initial_state, &mut path).await?;

        let halt = loop {
            if (self.predicate)(&state) {
                if let Some(finalize) = &self.finalize {
                    state = finalize.drive(run_id, state, &mut path).await?.0;
                }
                info!(refinements, "result accepted");
                break Halt::End;
            }

            if refinements >= self.max_refinements {
                warn!(
                    max_refinements = self.max_refinements,
                    "refinement budget exhausted, returning last result"
                );
                state.mark_loop_limit_reached();
                break Halt::LoopLimit;
            }

            refinements += 1;
            debug!(refinement = refinements, "result rejected, remediating");
            state = self.remediation.drive(run_id, state, &mut path).await?.0;
        };

        Ok(RefinementOutcome {
            run: RunOutcome {
                run_id,
                state,
                halt,
                path,
                started_at,
                finished_at: Utc::now(),
            },
            refinements,
        })
    }
}

/// Assembles a [`BoundedRefinement`]; see [`BoundedRefinement::builder`].
pub struct RefinementBuilder {
    nodes: NodeRegistry,
    produce: Vec<String>,
    validate: Option<String>,
    remediate: Option<String>,
    finalize: Option<String>,
    max_refinements: usize,
    predicate: Predicate,
}

impl RefinementBuilder {
    /// Nodes that produce a candidate result, run in order.
    pub fn produce<I, S>(mut self, chain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produce = chain.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(mut self, node: impl Into<String>) -> Self {
        self.validate = Some(node.into());
        self
    }

    pub fn remediate(mut self, node: impl Into<String>) -> Self {
        self.remediate = Some(node.into());
        self
    }

    /// Node run once after the result is accepted. Not run on exhaustion.
    pub fn finalize(mut self, node: impl Into<String>) -> Self {
        self.finalize = Some(node.into());
        self
    }

    /// Maximum number of remediation passes (default 2).
    pub fn max_refinements(mut self, n: usize) -> Self {
        self.max_refinements = n;
        self
    }

    /// Acceptance check (default: the `valid` field is `true`).
    pub fn predicate<F>(mut self, f: F) -> Self
    where
        F: Fn(&State) -> bool + Send + Sync + 'static,
    {
        self.predicate = Arc::new(f);
        self
    }

    /// Validate every named node and install the pass graphs.
    ///
    /// # Errors
    /// - [`EngineError::MissingRole`] when a role is unset or the produce
    ///   chain is empty.
    /// - [`EngineError::RepeatedRole`] when a node name fills two slots.
    ///   Pass graphs are keyed by node name, so a repeat would overwrite an
    ///   earlier edge.
    /// - Any error from [`GraphExecutor::new`].
    pub fn build(self) -> Result<BoundedRefinement, EngineError> {
        if self.produce.is_empty() {
            return Err(EngineError::MissingRole("produce"));
        }
        let validate = self.validate.ok_or(EngineError::MissingRole("validate"))?;
        let remediate = self.remediate.ok_or(EngineError::MissingRole("remediate"))?;

        let mut seen = HashSet::new();
        let roles = self
            .produce
            .iter()
            .chain([&validate, &remediate])
            .chain(self.finalize.as_ref());
        for name in roles {
            if !seen.insert(name.as_str()) {
                return Err(EngineError::RepeatedRole(name.clone()));
            }
        }

        let mut initial_chain: Vec<&str> = self.produce.iter().map(String::as_str).collect();
        initial_chain.push(&validate);

        let mut remediation_chain = vec![remediate.as_str()];
        remediation_chain.extend(initial_chain.iter().copied());

        let initial = pass(&self.nodes, &initial_chain)?;
        let remediation = pass(&self.nodes, &remediation_chain)?;
        let finalize = match &self.finalize {
            Some(name) => Some(pass(&self.nodes, &[name.as_str()])?),
            None => None,
        };

        debug!(entry = %initial_chain[0], "refinement loop assembled");
        Ok(BoundedRefinement {
            initial,
            remediation,
            finalize,
            predicate: self.predicate,
            max_refinements: self.max_refinements,
        })
    }
}

/// Summarize `input_text`, enriching the summary until it is long enough.
///
/// `read_input → summarize → validate_summary`, remediated by `enrich`, with
/// `finalize` on acceptance. Node names are the built-in catalog's.
pub fn summarize_loop(
    nodes: NodeRegistry,
    max_refinements: usize,
) -> Result<BoundedRefinement, EngineError> {
    BoundedRefinement::builder(nodes)
        .produce(["read_input", "summarize"])
        .validate("validate_summary")
        .remediate("enrich")
        .finalize("finalize")
        .max_refinements(max_refinements)
        .build()
}

/// Answer `input_text` from retrieved documents, widening retrieval until
/// `validate_answer` accepts the answer.
pub fn rag_loop(
    nodes: NodeRegistry,
    max_refinements: usize,
) -> Result<BoundedRefinement, EngineError> {
    BoundedRefinement::builder(nodes)
        .produce(["retrieve", "rag_answer"])
        .validate("validate_answer")
        .remediate("widen_retrieval")
        .max_refinements(max_refinements)
        .build()
}

/// A straight-line graph whose ceiling lets it reach END without truncation.
fn pass(nodes: &NodeRegistry, chain: &[&str]) -> Result<GraphExecutor, EngineError> {
    GraphExecutor::new(nodes.clone(), graph::chain(chain), chain[0], chain.len())
}

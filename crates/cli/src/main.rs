//! `loopgraph` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`  — check a graph definition JSON file.
//! - `run`       — run a graph definition and print the outcome as JSON.
//! - `ask`       — answer a question through the math agent.
//! - `summarize` — summarize text, enriching short summaries.
//! - `rag`       — run the retrieve/answer/validate refinement loop.
//!
//! Logs go to stderr; stdout carries only results.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use engine::agent::MathAgent;
use engine::refine::{rag_loop, summarize_loop};
use engine::GraphDefinition;
use nodes::builtin::{self, ValidateField};
use nodes::llm::{FakeLlm, FallbackLlm, LlmClient, LlmConfig};
use nodes::retrieval::{KeywordRetriever, Retriever};
use nodes::{ExecutableNode, State};

const DEFAULT_FILTER: &str = "loopgraph=info,engine=info,nodes=info,warn";

#[derive(Parser)]
#[command(
    name = "loopgraph",
    about = "Minimal graph execution engine with bounded loops",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a graph definition JSON file.
    Validate {
        /// Path to the graph JSON file.
        path: PathBuf,
    },
    /// Run a graph definition and print the outcome.
    Run {
        /// Path to the graph JSON file.
        path: PathBuf,
        /// Initial state as a JSON object.
        #[arg(long)]
        state: Option<String>,
        /// Override the definition's loop ceiling.
        #[arg(long, env = "LOOPGRAPH_LOOP_CEILING")]
        loop_ceiling: Option<usize>,
        #[command(flatten)]
        deps: Deps,
    },
    /// Answer a question, computing arithmetic locally.
    Ask {
        query: String,
        /// Use the offline model instead of Ollama.
        #[arg(long)]
        fake_llm: bool,
    },
    /// Summarize text, enriching the summary until it is long enough.
    Summarize {
        /// Text to summarize (defaults to the demo document).
        text: Option<String>,
        #[arg(long, default_value_t = 2)]
        max_refinements: usize,
        #[command(flatten)]
        deps: Deps,
    },
    /// Answer a question from the corpus, widening retrieval until the
    /// answer mentions the required term.
    Rag {
        query: String,
        #[arg(long, default_value_t = 2)]
        max_refinements: usize,
        /// Term the answer must contain to be accepted.
        #[arg(long, default_value = "LangGraph")]
        require: String,
        #[command(flatten)]
        deps: Deps,
    },
}

/// External collaborators for graphs built from the node catalog.
#[derive(clap::Args)]
struct Deps {
    /// Use the offline model instead of Ollama.
    #[arg(long)]
    fake_llm: bool,
    /// JSON array of strings to retrieve from (defaults to the demo corpus).
    #[arg(long)]
    corpus: Option<PathBuf>,
}

impl Deps {
    fn catalog(&self) -> anyhow::Result<std::collections::HashMap<String, Arc<dyn ExecutableNode>>> {
        Ok(builtin::catalog(llm(self.fake_llm), self.retriever()?))
    }

    fn retriever(&self) -> anyhow::Result<Arc<dyn Retriever>> {
        let Some(path) = &self.corpus else {
            return Ok(Arc::new(KeywordRetriever::demo()));
        };
        let texts: Vec<String> = serde_json::from_str(&read(path)?)
            .with_context(|| format!("corpus {} is not a JSON array of strings", path.display()))?;
        debug!(documents = texts.len(), "corpus loaded");
        Ok(Arc::new(KeywordRetriever::from_texts(texts)))
    }
}

fn llm(fake: bool) -> Arc<dyn LlmClient> {
    if fake {
        Arc::new(FakeLlm)
    } else {
        Arc::new(FallbackLlm::ollama(LlmConfig::from_env()))
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))
}

fn load_graph(path: &Path) -> anyhow::Result<GraphDefinition> {
    GraphDefinition::from_json(&read(path)?)
        .with_context(|| format!("invalid graph definition {}", path.display()))
}

fn parse_state(raw: Option<&str>) -> anyhow::Result<State> {
    let Some(raw) = raw else {
        return Ok(State::new());
    };
    let value = serde_json::from_str(raw).context("--state is not valid JSON")?;
    match State::from_value(value) {
        Some(state) => Ok(state),
        None => bail!("--state must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let def = load_graph(&path)?;
            let catalog = builtin::catalog(Arc::new(FakeLlm), Arc::new(KeywordRetriever::demo()));
            match def.build(&catalog) {
                Ok(exec) => {
                    println!(
                        "graph '{}' is valid: entry {}, {} nodes, loop ceiling {}",
                        def.name,
                        exec.entry(),
                        exec.node_count(),
                        exec.loop_ceiling()
                    );
                }
                Err(e) => {
                    eprintln!("validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            path,
            state,
            loop_ceiling,
            deps,
        } => {
            let mut def = load_graph(&path)?;
            if let Some(ceiling) = loop_ceiling {
                def.loop_ceiling = ceiling;
            }
            let exec = def
                .build(&deps.catalog()?)
                .with_context(|| format!("cannot build graph '{}'", def.name))?;
            info!(graph = %def.name, "running graph");

            let outcome = exec.run(parse_state(state.as_deref())?).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Ask { query, fake_llm } => {
            let outcome = MathAgent::new(llm(fake_llm)).ask(&query).await?;
            match (outcome.state.get_str("answer"), outcome.state.error()) {
                (_, Some(error)) => println!("{error}"),
                (Some(answer), None) => println!("{answer}"),
                (None, None) => println!("(no answer)"),
            }
        }
        Command::Summarize {
            text,
            max_refinements,
            deps,
        } => {
            let mut state = State::new();
            if let Some(text) = text {
                state.insert("input_text", text);
            }
            let outcome = summarize_loop(deps.catalog()?, max_refinements)?
                .run(state)
                .await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Rag {
            query,
            max_refinements,
            require,
            deps,
        } => {
            let mut nodes = deps.catalog()?;
            nodes.insert(
                "validate_answer".into(),
                Arc::new(ValidateField::containing("answer", require)),
            );

            let mut state = State::new();
            state.insert("input_text", query);
            let outcome = rag_loop(nodes, max_refinements)?.run(state).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}

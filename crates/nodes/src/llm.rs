//! Language-model access for nodes.
//!
//! [`FallbackLlm`] talks to a local Ollama install and tries, in order:
//! 1. the HTTP API (`POST {host}/api/generate`),
//! 2. `ollama run MODEL --prompt PROMPT`,
//! 3. `ollama run MODEL` with the prompt piped to stdin.
//!
//! The first strategy to produce non-empty output wins. If all of them fail
//! the caller gets a single [`LlmError::Exhausted`] listing every failure.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{strategy}: request failed: {message}")]
    Request { strategy: String, message: String },

    #[error("{strategy}: timed out after {timeout_secs}s")]
    Timeout { strategy: String, timeout_secs: u64 },

    #[error("{strategy}: empty output")]
    EmptyOutput { strategy: String },

    #[error("could not call model '{model}'; tried: {}", .failures.join("; "))]
    Exhausted { model: String, failures: Vec<String> },
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short label used in logs and error reports.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    /// Base URL of the Ollama HTTP API.
    pub host: String,
    /// Executable used by the command-line strategies.
    pub binary: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:3b".into(),
            host: "http://localhost:11434".into(),
            binary: "ollama".into(),
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    /// Defaults overridden by `OLLAMA_MODEL` and `OLLAMA_HOST`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            config.model = model;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            config.host = host;
        }
        config
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// In-process HTTP client for the Ollama API.
pub struct OllamaHttp {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OllamaHttp {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn request_error(&self, e: impl std::fmt::Display) -> LlmError {
        LlmError::Request {
            strategy: self.name().into(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaHttp {
    fn name(&self) -> &str {
        "ollama-http"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.config.host.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let resp = self
            .http
            .post(&url)
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        strategy: self.name().into(),
                        timeout_secs: self.config.timeout.as_secs(),
                    }
                } else {
                    self.request_error(e)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.request_error(format!("HTTP {status}: {text}")));
        }

        let parsed: GenerateResponse = resp.json().await.map_err(|e| self.request_error(e))?;
        non_empty(self.name(), &parsed.response)
    }
}

/// `ollama run MODEL --prompt PROMPT`.
pub struct CliPromptArg {
    config: LlmConfig,
}

impl CliPromptArg {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LlmClient for CliPromptArg {
    fn name(&self) -> &str {
        "cli-prompt-arg"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("run")
            .arg(&self.config.model)
            .arg("--prompt")
            .arg(prompt)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.config.timeout, cmd.output())
            .await
            .map_err(|_| LlmError::Timeout {
                strategy: self.name().into(),
                timeout_secs: self.config.timeout.as_secs(),
            })?
            .map_err(|e| LlmError::Request {
                strategy: self.name().into(),
                message: e.to_string(),
            })?;

        // Some CLI versions exit non-zero yet still print a usable answer.
        non_empty(self.name(), &String::from_utf8_lossy(&output.stdout))
    }
}

/// `ollama run MODEL` with the prompt written to stdin.
pub struct CliStdin {
    config: LlmConfig,
}

impl CliStdin {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    async fn run(&self, prompt: &str) -> std::io::Result<std::process::Output> {
        let mut child = Command::new(&self.config.binary)
            .arg("run")
            .arg(&self.config.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading the whole prompt may still
            // have printed an answer.
            match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!(strategy = self.name(), "model closed stdin early");
                }
                Err(e) => return Err(e),
            }
            // Dropping stdin closes the pipe so the model sees EOF.
        }
        child.wait_with_output().await
    }
}

#[async_trait]
impl LlmClient for CliStdin {
    fn name(&self) -> &str {
        "cli-stdin"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let output = tokio::time::timeout(self.config.timeout, self.run(prompt))
            .await
            .map_err(|_| LlmError::Timeout {
                strategy: self.name().into(),
                timeout_secs: self.config.timeout.as_secs(),
            })?
            .map_err(|e| LlmError::Request {
                strategy: self.name().into(),
                message: e.to_string(),
            })?;

        non_empty(self.name(), &String::from_utf8_lossy(&output.stdout))
    }
}

fn non_empty(strategy: &str, text: &str) -> Result<String, LlmError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(LlmError::EmptyOutput {
            strategy: strategy.into(),
        })
    } else {
        Ok(trimmed.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Fallback chain
// ---------------------------------------------------------------------------

/// Tries each strategy in turn until one answers.
pub struct FallbackLlm {
    model: String,
    strategies: Vec<Arc<dyn LlmClient>>,
}

impl FallbackLlm {
    pub fn new(model: impl Into<String>, strategies: Vec<Arc<dyn LlmClient>>) -> Self {
        Self {
            model: model.into(),
            strategies,
        }
    }

    /// The standard HTTP → CLI argument → CLI stdin chain.
    pub fn ollama(config: LlmConfig) -> Self {
        let strategies: Vec<Arc<dyn LlmClient>> = vec![
            Arc::new(OllamaHttp::new(config.clone())),
            Arc::new(CliPromptArg::new(config.clone())),
            Arc::new(CliStdin::new(config.clone())),
        ];
        Self::new(config.model, strategies)
    }
}

#[async_trait]
impl LlmClient for FallbackLlm {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut failures = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            match strategy.generate(prompt).await {
                Ok(text) => {
                    debug!(strategy = strategy.name(), "model answered");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "model strategy failed, trying next");
                    failures.push(e.to_string());
                }
            }
        }

        Err(LlmError::Exhausted {
            model: self.model.clone(),
            failures,
        })
    }
}

// ---------------------------------------------------------------------------
// Offline stand-ins
// ---------------------------------------------------------------------------

/// Deterministic offline model used by demos and tests.
pub struct FakeLlm;

pub const FAKE_SUMMARY: &str = "Summary: LangGraph is a graph-based agent framework.";

#[async_trait]
impl LlmClient for FakeLlm {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.to_lowercase().contains("summarize") {
            return Ok(FAKE_SUMMARY.to_owned());
        }
        let head: String = prompt.chars().take(100).collect();
        Ok(format!("Response: {head}"))
    }
}

/// Always answers with the same text.
pub struct StaticLlm(pub String);

#[async_trait]
impl LlmClient for StaticLlm {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(self.0.clone())
    }
}

/// Always fails; stands in for an unreachable model.
pub struct FailingLlm;

#[async_trait]
impl LlmClient for FailingLlm {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Request {
            strategy: self.name().into(),
            message: "model offline".into(),
        })
    }
}

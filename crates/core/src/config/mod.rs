use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable holding the model API key, used when the config has none.
pub const API_KEY_ENV: &str = "MONOCLE_API_KEY";
/// Environment variable overriding the model endpoint.
pub const ENDPOINT_ENV: &str = "MONOCLE_ENDPOINT";

/// Settings for the Ghidra headless driver and the batch pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompilerConfig {
    /// Explicit path to `analyzeHeadless`. Takes precedence over env and PATH lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless_path: Option<PathBuf>,
    /// Worker count for folder decompilation. Defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs: Option<usize>,
    /// Deadline for one `analyzeHeadless` run, in seconds. `0` disables it.
    pub timeout_secs: u64,
    /// Forwarded to Ghidra as `-analysisTimeoutPerFile`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_timeout_per_file: Option<u64>,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self { headless_path: None, jobs: None, timeout_secs: 600, analysis_timeout_per_file: None }
    }
}

impl DecompilerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Resolved worker count, never zero.
    pub fn worker_count(&self) -> usize {
        self.jobs
            .filter(|n| *n > 0)
            .or_else(|| std::thread::available_parallelism().ok().map(|n| n.get()))
            .unwrap_or(1)
    }
}

/// How the language model is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackendKind {
    /// OpenAI-compatible chat completions endpoint.
    Http,
    /// Local program reading the prompt on stdin and answering on stdout.
    Command,
}

/// Settings for the inference backend and response handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: ModelBackendKind,
    /// Base URL of the chat completions API (without `/chat/completions`).
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Program and arguments for the command backend.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    pub max_tokens: u32,
    /// Deadline for one inference call, in seconds. `0` disables it.
    pub timeout_secs: u64,
    /// Extra attempts when the model answer cannot be parsed.
    pub parse_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackendKind::Http,
            endpoint: "http://127.0.0.1:8080/v1".to_string(),
            model: "mistral-7b-instruct-v0.2".to_string(),
            api_key: None,
            command: Vec::new(),
            max_tokens: 200,
            timeout_secs: 120,
            parse_retries: 0,
        }
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Top-level configuration, loadable from `.json`, `.yaml` or `.yml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonocleConfig {
    pub decompiler: DecompilerConfig,
    pub model: ModelConfig,
}

impl MonocleConfig {
    /// Overlay the environment on file values.
    ///
    /// `MONOCLE_ENDPOINT` replaces the file's endpoint; command-line flags are
    /// applied afterwards and win over both. `MONOCLE_API_KEY` only fills a key
    /// the file left unset.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.model.api_key.is_none() {
            self.model.api_key = lookup(API_KEY_ENV).filter(|k| !k.is_empty());
        }
        if let Some(endpoint) = lookup(ENDPOINT_ENV).filter(|e| !e.is_empty()) {
            self.model.endpoint = endpoint;
        }
    }
}

/// Load a config file, picking the format from its extension.
pub fn load_config(path: &Path) -> Result<MonocleConfig> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config at {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        "json" => serde_json::from_str(&body).context("Failed to parse config JSON"),
        "yaml" | "yml" => serde_yaml::from_str(&body).context("Failed to parse config YAML"),
        other => Err(anyhow!("Unsupported config format '{other}' (use .json, .yaml or .yml)")),
    }
}

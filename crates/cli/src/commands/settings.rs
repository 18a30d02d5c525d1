use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use monocle_core::config::{load_config, ModelBackendKind, MonocleConfig};
use tracing::debug;

/// Command-line values layered over the config file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub headless: Option<PathBuf>,
    pub jobs: Option<usize>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    /// Whitespace-separated program and arguments for the command backend.
    pub model_command: Option<String>,
}

/// Build the effective config: file (or defaults), then env vars, then flags.
pub fn resolve_config(config_path: Option<&Path>, overrides: &Overrides) -> Result<MonocleConfig> {
    let mut config = match config_path {
        Some(path) => load_config(path)?,
        None => MonocleConfig::default(),
    };
    config.apply_env();

    if let Some(headless) = &overrides.headless {
        config.decompiler.headless_path = Some(headless.clone());
    }
    if let Some(jobs) = overrides.jobs {
        if jobs == 0 {
            bail!("--jobs must be at least 1");
        }
        config.decompiler.jobs = Some(jobs);
    }
    if let Some(endpoint) = &overrides.endpoint {
        config.model.endpoint = endpoint.clone();
    }
    if let Some(model) = &overrides.model {
        config.model.model = model.clone();
    }
    if let Some(command) = &overrides.model_command {
        let parts: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            bail!("--model-command must name a program");
        }
        config.model.backend = ModelBackendKind::Command;
        config.model.command = parts;
    }

    debug!(decompiler = ?config.decompiler, backend = ?config.model.backend, "resolved configuration");
    Ok(config)
}

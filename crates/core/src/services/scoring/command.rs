use std::process::Command;
use std::time::Duration;

use tracing::debug;

use crate::config::ModelConfig;
use crate::services::process::{run_with_deadline, ProcessError};
use crate::services::scoring::{InferenceBackend, InferenceError};

/// Runs a local program per prompt: prompt on stdin, completion on stdout.
///
/// Works with anything that behaves like `llm -m mistral` or `ollama run mistral`.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Option<Duration>) -> Self {
        Self { program: program.into(), args, timeout }
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, InferenceError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| InferenceError::Config("model.command is empty".to_string()))?;
        Ok(Self::new(program.clone(), args.to_vec(), config.timeout()))
    }
}

impl InferenceBackend for CommandBackend {
    fn complete(&mut self, prompt: &str) -> Result<String, InferenceError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        debug!(program = %self.program, "running inference command");

        let output = run_with_deadline(cmd, Some(prompt.as_bytes()), self.timeout).map_err(|e| match e {
            ProcessError::Timeout { after, .. } => InferenceError::Timeout(after),
            other => InferenceError::Command(other.to_string()),
        })?;
        if !output.status.success() {
            return Err(InferenceError::Command(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                output.stderr_tail(5)
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        if text.trim().is_empty() {
            return Err(InferenceError::EmptyResponse);
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

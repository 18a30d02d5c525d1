//! Scoring of decompiled functions with a language model.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ModelBackendKind, ModelConfig};
use crate::model::{FunctionRecord, ScoreResult};

pub mod command;
#[cfg(feature = "http-backend")]
pub mod http;
pub mod prompt;
pub mod response;

pub use command::CommandBackend;
#[cfg(feature = "http-backend")]
pub use http::HttpBackend;
pub use prompt::build_prompt;
pub use response::{clean_response, parse_response, ScoreParseError};

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("inference request failed: {0}")]
    Request(String),
    #[error("inference endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("inference command failed: {0}")]
    Command(String),
    #[error("inference timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("inference returned no text")]
    EmptyResponse,
    #[error("inference backend misconfigured: {0}")]
    Config(String),
}

/// Black-box "complete this prompt" capability.
///
/// Takes `&mut self`: a backend is a single non-reentrant resource and calls
/// never overlap.
pub trait InferenceBackend {
    fn complete(&mut self, prompt: &str) -> Result<String, InferenceError>;
    fn name(&self) -> &'static str;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn complete(&mut self, prompt: &str) -> Result<String, InferenceError> {
        (**self).complete(prompt)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Build the backend selected by `config`.
pub fn backend_from_config(config: &ModelConfig) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    match config.backend {
        ModelBackendKind::Command => Ok(Box::new(CommandBackend::from_config(config)?)),
        #[cfg(feature = "http-backend")]
        ModelBackendKind::Http => Ok(Box::new(HttpBackend::from_config(config)?)),
        #[cfg(not(feature = "http-backend"))]
        ModelBackendKind::Http => {
            Err(InferenceError::Config("built without the http-backend feature".to_string()))
        }
    }
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("unparseable model response: {0}")]
    Parse(#[from] ScoreParseError),
}

impl ScoreError {
    pub fn is_parse(&self) -> bool {
        matches!(self, ScoreError::Parse(_))
    }
}

/// Turns function records into scores, one model call at a time.
pub struct ScoringEngine<B> {
    backend: B,
    parse_retries: u32,
}

impl<B: InferenceBackend> ScoringEngine<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, parse_retries: 0 }
    }

    /// Extra attempts when the answer cannot be parsed.
    pub fn with_parse_retries(mut self, retries: u32) -> Self {
        self.parse_retries = retries;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Ask the model how strongly `record` matches `description`.
    pub fn score(&mut self, record: &FunctionRecord, description: &str) -> Result<ScoreResult, ScoreError> {
        let prompt = build_prompt(description, &record.code);
        let mut attempt = 0;
        loop {
            let raw = self.backend.complete(&prompt)?;
            let cleaned = clean_response(&raw);
            match parse_response(&cleaned) {
                Ok((score, explanation)) => {
                    debug!(function = %record.function_name, score, "scored");
                    return Ok(ScoreResult::new(record, score, explanation));
                }
                Err(err) if attempt < self.parse_retries => {
                    attempt += 1;
                    warn!(function = %record.function_name, attempt, "retrying unparseable response: {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

//! Ghidra headless decompilation.
//!
//! `script` renders the export script, `headless` resolves and drives
//! `analyzeHeadless` for one binary, and `batch` fans that out over a folder.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub mod batch;
pub mod headless;
pub mod script;

pub use batch::{BatchDecompiler, BatchProgress, BatchReport, BinaryOutcome, BinaryReport};
pub use headless::{locate_headless, HeadlessDriver};

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("analyzeHeadless not found: {0}")]
    ToolNotFound(String),
    #[error("Binary not found at {0}")]
    MissingBinary(PathBuf),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
    #[error("Failed to render export script: {0}")]
    Script(String),
    #[error("failed to spawn decompiler: {0}")]
    Spawn(String),
    #[error("decompiler exited with {status}: {stderr_tail}")]
    Failed { status: String, stderr_tail: String },
    #[error("decompiler timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("decompiler succeeded but wrote no functions for {0}")]
    NoOutput(String),
}

impl DecompileError {
    /// Short machine-friendly kind, used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            DecompileError::ToolNotFound(_) => "tool_not_found",
            DecompileError::MissingBinary(_) => "missing_binary",
            DecompileError::Io { .. } | DecompileError::NonUtf8Path(_) => "io",
            DecompileError::Script(_) => "script",
            DecompileError::Spawn(_) => "spawn",
            DecompileError::Failed { .. } => "failed",
            DecompileError::Timeout(_) => "timeout",
            DecompileError::NoOutput(_) => "no_output",
        }
    }
}

/// What one successful decompilation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecompileReport {
    pub binary_path: PathBuf,
    pub binary_hash: String,
    /// Artifacts in the output directory that belong to this binary.
    pub functions: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

/// Something that turns one binary into per-function artifacts in `output_dir`.
pub trait Decompiler: Send + Sync {
    fn decompile(&self, binary: &Path, output_dir: &Path) -> Result<DecompileReport, DecompileError>;
    fn name(&self) -> &'static str;
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

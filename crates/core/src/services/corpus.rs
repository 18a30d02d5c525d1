//! Artifact naming contract and loading of decompiled functions.
//!
//! Artifacts are flat files named `<binary>__<function>__<epoch>.c`, with every
//! character outside `[A-Za-z0-9_.\/-]` replaced by `_`. The export script
//! writes them; [`load`] reads them back into [`FunctionRecord`]s.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::FunctionRecord;

/// Separator between the fields of an artifact name.
pub const SEPARATOR: &str = "__";
/// Extension of every artifact.
pub const ARTIFACT_EXTENSION: &str = ".c";

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '\\' | '/' | '-')
}

/// Replace every disallowed character with `_`. Idempotent.
pub fn sanitize_artifact_name(name: &str) -> String {
    name.chars().map(|c| if is_allowed(c) { c } else { '_' }).collect()
}

/// Build the sanitized artifact name the export script would write.
pub fn artifact_file_name(binary_name: &str, function_name: &str, epoch_secs: u64) -> String {
    sanitize_artifact_name(&format!(
        "{binary_name}{SEPARATOR}{function_name}{SEPARATOR}{epoch_secs}{ARTIFACT_EXTENSION}"
    ))
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed artifact name '{name}': {reason}")]
pub struct MalformedArtifactError {
    pub name: String,
    pub reason: String,
}

/// Fields recovered from an artifact name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArtifact {
    pub binary_name: String,
    pub function_name: String,
    pub epoch_secs: Option<u64>,
}

/// Parse `<binary>__<function>__<epoch>.c`.
///
/// When the name ends in a numeric epoch, the binary name runs up to the first
/// separator and the function name is everything up to the last one, so names
/// like `__libc_csu_init` survive. Without an epoch, the second field is the
/// function name and any further fields are ignored. Binary names containing
/// `__` stay ambiguous.
pub fn parse_artifact_name(name: &str) -> Result<ParsedArtifact, MalformedArtifactError> {
    let malformed = |reason: &str| MalformedArtifactError {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let stem = name.strip_suffix(ARTIFACT_EXTENSION).unwrap_or(name);
    let with_epoch = stem.rsplit_once(SEPARATOR).and_then(|(rest, last)| {
        let epoch = last.parse::<u64>().ok().filter(|_| last.bytes().all(|b| b.is_ascii_digit()))?;
        let (binary, function) = rest.split_once(SEPARATOR)?;
        Some((binary, function, Some(epoch)))
    });
    let (binary_name, function_name, epoch_secs) = match with_epoch {
        Some(parts) => parts,
        None => {
            let mut fields = stem.split(SEPARATOR);
            match (fields.next(), fields.next()) {
                (Some(binary), Some(function)) => (binary, function, None),
                _ => return Err(malformed("expected <binary>__<function>__<epoch>.c")),
            }
        }
    };

    if binary_name.is_empty() {
        return Err(malformed("empty binary name"));
    }
    if function_name.is_empty() {
        return Err(malformed("empty function name"));
    }

    Ok(ParsedArtifact {
        binary_name: binary_name.to_string(),
        function_name: function_name.to_string(),
        epoch_secs,
    })
}

/// An artifact that was skipped during [`load`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedArtifact {
    pub path: PathBuf,
    pub reason: String,
}

/// Records loaded from an output directory plus the artifacts that were skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<FunctionRecord>,
    pub malformed: Vec<MalformedArtifact>,
}

/// Load every artifact in `output_dir`, in directory-listing order.
///
/// Malformed names and unreadable files are skipped and reported in
/// [`LoadReport::malformed`]; only failing to list the directory is an error.
pub fn load(output_dir: &Path) -> io::Result<LoadReport> {
    let mut report = LoadReport::default();
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();

        let parsed = match parse_artifact_name(&file_name) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(path = %path.display(), "skipping artifact: {err}");
                report.malformed.push(MalformedArtifact { path, reason: err.reason });
                continue;
            }
        };
        let code = match fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                warn!(path = %path.display(), "skipping unreadable artifact: {err}");
                report.malformed.push(MalformedArtifact { path, reason: err.to_string() });
                continue;
            }
        };

        report.records.push(FunctionRecord {
            binary_name: parsed.binary_name,
            function_name: parsed.function_name,
            code,
        });
    }
    debug!(
        records = report.records.len(),
        malformed = report.malformed.len(),
        dir = %output_dir.display(),
        "loaded artifacts"
    );
    Ok(report)
}

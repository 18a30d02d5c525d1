use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use monocle_core::services::corpus;
use monocle_core::services::decompiler::{BatchDecompiler, BinaryOutcome, BinaryReport, HeadlessDriver};
use monocle_core::services::pipeline::decompile_target;
use serde::Serialize;

use crate::absolute_path;
use crate::commands::settings::{resolve_config, Overrides};

#[derive(Debug, Serialize)]
pub struct DecompiledBinary {
    pub binary: PathBuf,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&BinaryReport> for DecompiledBinary {
    fn from(report: &BinaryReport) -> Self {
        let (status, functions, error) = match &report.outcome {
            BinaryOutcome::Decompiled(r) => ("decompiled", Some(r.functions), None),
            BinaryOutcome::Duplicate { .. } => ("duplicate", None, None),
            BinaryOutcome::Failed(err) => ("failed", None, Some(err.to_string())),
        };
        Self { binary: report.binary.clone(), status, functions, error }
    }
}

/// Progress line on stderr for each finished binary.
pub fn print_progress(completed: usize, total: usize, report: &BinaryReport) {
    eprintln!("[{completed}/{total}] {}: {}", report.binary.display(), report.describe());
}

/// Decompile `input` (file or folder) into `output` without scoring anything.
pub fn decompile_command(
    input: &Path,
    output: &Path,
    config_path: Option<&Path>,
    overrides: &Overrides,
    json: bool,
) -> Result<()> {
    let config = resolve_config(config_path, overrides)?;
    let driver = HeadlessDriver::from_config(&config.decompiler)
        .context("Ghidra headless analyzer is not available")?;
    let batch = BatchDecompiler::new(driver, config.decompiler.worker_count());

    let output = absolute_path(output)?;
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create output dir {}", output.display()))?;

    let mut progress = print_progress;
    let report = decompile_target(&batch, input, &output, &mut progress)?;
    let binaries: Vec<DecompiledBinary> = report.binaries.iter().map(DecompiledBinary::from).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&binaries).context("Failed to serialize decompile report")?
        );
    } else {
        let loaded = corpus::load(&output)
            .with_context(|| format!("Failed to read artifacts in {}", output.display()))?;
        println!("Decompiled {} of {} binaries", report.succeeded(), report.total());
        if report.duplicates() > 0 {
            println!("  Duplicates skipped: {}", report.duplicates());
        }
        for failed in report.failures() {
            println!("  Failed: {} ({})", failed.binary.display(), failed.describe());
        }
        println!("  Functions on disk: {}", loaded.records.len());
        println!("  Output: {}", output.display());
    }

    if report.total() > 0 && report.succeeded() == 0 && report.duplicates() == 0 {
        bail!("no binary could be decompiled");
    }
    Ok(())
}

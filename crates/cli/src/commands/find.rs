use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use monocle_core::services::decompiler::{BatchDecompiler, HeadlessDriver};
use monocle_core::services::pipeline::{Pipeline, RunSummary};
use monocle_core::services::ranking::{NullSink, TableSink};
use monocle_core::services::scoring::{backend_from_config, ScoringEngine};
use tracing::info;

use crate::absolute_path;
use crate::commands::decompile::print_progress;
use crate::commands::settings::{resolve_config, Overrides};
use crate::display::TerminalSink;

#[derive(Debug, Clone)]
pub struct FindArgs {
    pub binary: PathBuf,
    pub find: String,
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
    pub json: bool,
    /// Keep decompiled functions here instead of a scratch directory. Must be empty or absent.
    pub keep_output: Option<PathBuf>,
}

/// Decompile, score and rank. Returns the run summary after printing it.
pub fn find_command(args: &FindArgs) -> Result<RunSummary> {
    if args.find.trim().is_empty() {
        bail!("--find must describe what to look for");
    }
    let config = resolve_config(args.config.as_deref(), &args.overrides)?;

    // Both tools must be usable before any work starts.
    let driver = HeadlessDriver::from_config(&config.decompiler)
        .context("Ghidra headless analyzer is not available")?;
    let backend = backend_from_config(&config.model).context("Failed to set up the model backend")?;
    info!(backend = backend.name(), "model backend ready");

    let batch = BatchDecompiler::new(driver, config.decompiler.worker_count());
    let engine = ScoringEngine::new(backend).with_parse_retries(config.model.parse_retries);
    let mut pipeline = Pipeline::new(batch, engine);

    let scratch;
    let output_dir: PathBuf = match &args.keep_output {
        Some(dir) => {
            let dir = absolute_path(dir)?;
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
            dir
        }
        None => {
            scratch = tempfile::Builder::new()
                .prefix("monocle-decoms-")
                .tempdir()
                .context("Failed to create scratch output dir")?;
            scratch.path().to_path_buf()
        }
    };

    let mut sink: Box<dyn TableSink> =
        if args.json { Box::new(NullSink) } else { Box::new(TerminalSink::stdout()) };
    let mut progress = print_progress;
    let summary =
        pipeline.run(&args.binary, &args.find, &output_dir, &mut progress, sink.as_mut())?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize run summary")?
        );
    } else {
        print_summary(&summary, args.keep_output.as_deref());
    }
    Ok(summary)
}

fn print_summary(summary: &RunSummary, kept: Option<&Path>) {
    println!();
    println!(
        "Binaries: {} decompiled, {} duplicate, {} failed (of {})",
        summary.binaries_decompiled,
        summary.binaries_duplicate,
        summary.binaries_failed.len(),
        summary.binaries_total
    );
    for failed in &summary.binaries_failed {
        println!("  - {} [{}] {}", failed.binary.display(), failed.kind, failed.error);
    }
    println!(
        "Functions: {} scored, {} unparseable, {} inference failures",
        summary.scored, summary.skipped_unparseable, summary.failed_inference
    );
    if !summary.malformed_artifacts.is_empty() {
        println!("Ignored {} malformed artifact(s)", summary.malformed_artifacts.len());
    }
    if summary.partial_discarded > 0 {
        println!("Ignored {} artifact(s) from failed binaries", summary.partial_discarded);
    }
    if let Some(dir) = kept {
        println!("Decompiled functions kept in {}", dir.display());
    }
}

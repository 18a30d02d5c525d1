use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::FunctionRecord;
use crate::services::corpus::{self, sanitize_artifact_name, MalformedArtifact};
use crate::services::decompiler::{
    BatchDecompiler, BatchProgress, BatchReport, BinaryOutcome, DecompileError, Decompiler,
};
use crate::services::ranking::{RankingTable, RenderedTable, TableSink};
use crate::services::scoring::{InferenceBackend, ScoreError, ScoringEngine};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Decompile(#[from] DecompileError),
    #[error("Output directory {} is not empty; use an empty or new directory", .0.display())]
    OutputNotEmpty(PathBuf),
    #[error("Failed to read decompiled functions in {path}: {source}")]
    Artifacts {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A binary that could not be decompiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBinary {
    pub binary: PathBuf,
    pub kind: String,
    pub error: String,
}

/// A function that was dropped from the ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreFailure {
    pub binary_name: String,
    pub function_name: String,
    pub kind: String,
    pub error: String,
}

/// Outcome of the scoring phase.
#[derive(Debug, Default)]
pub struct ScoringReport {
    pub ranking: RankingTable,
    pub failures: Vec<ScoreFailure>,
}

impl ScoringReport {
    pub fn skipped_unparseable(&self) -> usize {
        self.failures.iter().filter(|f| f.kind == "parse").count()
    }

    pub fn failed_inference(&self) -> usize {
        self.failures.iter().filter(|f| f.kind == "inference").count()
    }
}

/// Everything a run did, including what it had to skip.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub description: String,
    pub target: PathBuf,
    pub binaries_total: usize,
    pub binaries_decompiled: usize,
    pub binaries_duplicate: usize,
    pub binaries_failed: Vec<FailedBinary>,
    pub functions_loaded: usize,
    /// Artifacts left behind by binaries that failed, not scored.
    pub partial_discarded: usize,
    pub malformed_artifacts: Vec<MalformedArtifact>,
    pub scored: usize,
    pub skipped_unparseable: usize,
    pub failed_inference: usize,
    pub score_failures: Vec<ScoreFailure>,
    pub ranking: RenderedTable,
    pub finished_at: String,
}

impl RunSummary {
    /// True when every binary failed and nothing could be ranked.
    pub fn nothing_decompiled(&self) -> bool {
        self.binaries_total > 0 && self.binaries_decompiled == 0 && self.binaries_duplicate == 0
    }
}

/// Decompile `target`: a single binary, or every regular file of a folder.
pub fn decompile_target<D: Decompiler>(
    batch: &BatchDecompiler<D>,
    target: &Path,
    output_dir: &Path,
    progress: &mut dyn BatchProgress,
) -> Result<BatchReport, DecompileError> {
    if target.is_dir() {
        batch.decompile_folder(target, output_dir, progress)
    } else if target.is_file() {
        Ok(batch.decompile_all(&[target.to_path_buf()], output_dir, progress))
    } else {
        Err(DecompileError::MissingBinary(target.to_path_buf()))
    }
}

/// Score `records` one at a time, publishing the table after every result.
///
/// A function whose scoring fails is logged, left out of the ranking and
/// counted; the remaining queue still runs.
pub fn score_records<B: InferenceBackend>(
    engine: &mut ScoringEngine<B>,
    records: &[FunctionRecord],
    description: &str,
    sink: &mut dyn TableSink,
) -> ScoringReport {
    let mut report = ScoringReport { ranking: RankingTable::new(description), failures: Vec::new() };
    for (idx, record) in records.iter().enumerate() {
        match engine.score(record, description) {
            Ok(result) => {
                let table = report.ranking.push(result);
                sink.publish(&table);
            }
            Err(err) => {
                let kind = match err {
                    ScoreError::Parse(_) => "parse",
                    ScoreError::Inference(_) => "inference",
                };
                warn!(
                    binary = %record.binary_name,
                    function = %record.function_name,
                    index = idx + 1,
                    total = records.len(),
                    "skipping function: {err}"
                );
                report.failures.push(ScoreFailure {
                    binary_name: record.binary_name.clone(),
                    function_name: record.function_name.clone(),
                    kind: kind.to_string(),
                    error: err.to_string(),
                });
            }
        }
    }
    report
}

fn has_entries(dir: &Path) -> std::io::Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Decompiler + scoring engine wired into one search.
pub struct Pipeline<D, B> {
    batch: BatchDecompiler<D>,
    engine: ScoringEngine<B>,
}

impl<D: Decompiler, B: InferenceBackend> Pipeline<D, B> {
    pub fn new(batch: BatchDecompiler<D>, engine: ScoringEngine<B>) -> Self {
        Self { batch, engine }
    }

    /// Decompile `target` into `output_dir`, then score every function against
    /// `description`. The two phases never overlap.
    ///
    /// Every artifact in `output_dir` is scored, so it must be absent or empty.
    pub fn run(
        &mut self,
        target: &Path,
        description: &str,
        output_dir: &Path,
        progress: &mut dyn BatchProgress,
        sink: &mut dyn TableSink,
    ) -> Result<RunSummary, PipelineError> {
        if has_entries(output_dir)
            .map_err(|source| PipelineError::Artifacts { path: output_dir.to_path_buf(), source })?
        {
            return Err(PipelineError::OutputNotEmpty(output_dir.to_path_buf()));
        }
        let batch = decompile_target(&self.batch, target, output_dir, progress)?;
        let binaries_failed: Vec<FailedBinary> = batch
            .binaries
            .iter()
            .filter_map(|b| match &b.outcome {
                BinaryOutcome::Failed(err) => Some(FailedBinary {
                    binary: b.binary.clone(),
                    kind: err.kind().to_string(),
                    error: err.to_string(),
                }),
                _ => None,
            })
            .collect();
        info!(
            decompiled = batch.succeeded(),
            failed = binaries_failed.len(),
            duplicates = batch.duplicates(),
            "decompilation finished"
        );

        let mut loaded = if output_dir.is_dir() {
            corpus::load(output_dir)
                .map_err(|source| PipelineError::Artifacts { path: output_dir.to_path_buf(), source })?
        } else {
            corpus::LoadReport::default()
        };

        // Partial output of a failed binary is not scored.
        let failed_programs: HashSet<String> = binaries_failed
            .iter()
            .filter_map(|f| f.binary.file_name())
            .map(|n| sanitize_artifact_name(&n.to_string_lossy()))
            .collect();
        let before = loaded.records.len();
        loaded.records.retain(|r| !failed_programs.contains(&r.binary_name));
        let partial_discarded = before - loaded.records.len();
        if partial_discarded > 0 {
            warn!(partial_discarded, "ignoring artifacts of failed binaries");
        }
        info!(functions = loaded.records.len(), "scoring functions");

        let scoring = score_records(&mut self.engine, &loaded.records, description, sink);
        let ranking = scoring.ranking.render();

        Ok(RunSummary {
            description: description.to_string(),
            target: target.to_path_buf(),
            binaries_total: batch.total(),
            binaries_decompiled: batch.succeeded(),
            binaries_duplicate: batch.duplicates(),
            binaries_failed,
            functions_loaded: loaded.records.len(),
            partial_discarded,
            malformed_artifacts: loaded.malformed,
            scored: scoring.ranking.len(),
            skipped_unparseable: scoring.skipped_unparseable(),
            failed_inference: scoring.failed_inference(),
            score_failures: scoring.failures,
            ranking,
            finished_at: Utc::now().to_rfc3339(),
        })
    }
}

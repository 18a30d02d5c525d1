use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::unbounded;
use tracing::{info, warn};

use crate::services::decompiler::{DecompileError, DecompileReport, Decompiler};
use crate::services::identify::hash_binary;

/// How a single binary fared in a batch.
#[derive(Debug)]
pub enum BinaryOutcome {
    Decompiled(DecompileReport),
    /// Same content as an earlier binary in this run; not decompiled again.
    Duplicate { of: PathBuf },
    Failed(DecompileError),
}

#[derive(Debug)]
pub struct BinaryReport {
    pub binary: PathBuf,
    pub outcome: BinaryOutcome,
}

impl BinaryReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, BinaryOutcome::Failed(_))
    }

    /// One-line human summary, e.g. for progress output.
    pub fn describe(&self) -> String {
        match &self.outcome {
            BinaryOutcome::Decompiled(r) => format!("{} functions", r.functions),
            BinaryOutcome::Duplicate { of } => format!("duplicate of {}", of.display()),
            BinaryOutcome::Failed(err) => format!("failed: {err}"),
        }
    }
}

/// Per-binary outcomes of a batch, in job order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub binaries: Vec<BinaryReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.binaries.len()
    }

    pub fn succeeded(&self) -> usize {
        self.binaries.iter().filter(|b| matches!(b.outcome, BinaryOutcome::Decompiled(_))).count()
    }

    pub fn duplicates(&self) -> usize {
        self.binaries.iter().filter(|b| matches!(b.outcome, BinaryOutcome::Duplicate { .. })).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BinaryReport> {
        self.binaries.iter().filter(|b| b.is_failure())
    }
}

/// Receives a callback as each binary finishes.
pub trait BatchProgress {
    fn on_binary_done(&mut self, completed: usize, total: usize, report: &BinaryReport);
}

impl<F> BatchProgress for F
where
    F: FnMut(usize, usize, &BinaryReport),
{
    fn on_binary_done(&mut self, completed: usize, total: usize, report: &BinaryReport) {
        self(completed, total, report)
    }
}

/// Fans a [`Decompiler`] out over many binaries with a bounded worker pool.
///
/// Every worker drives its own subprocess and scratch workspace; the only
/// shared resource is the output directory, where artifact names are unique
/// per program and function.
pub struct BatchDecompiler<D> {
    decompiler: D,
    workers: usize,
}

impl<D: Decompiler> BatchDecompiler<D> {
    pub fn new(decompiler: D, workers: usize) -> Self {
        Self { decompiler, workers: workers.max(1) }
    }

    pub fn decompiler(&self) -> &D {
        &self.decompiler
    }

    /// Decompile a single binary.
    pub fn decompile_one(&self, binary: &Path, output_dir: &Path) -> BinaryReport {
        let outcome = match self.decompiler.decompile(binary, output_dir) {
            Ok(report) => BinaryOutcome::Decompiled(report),
            Err(err) => BinaryOutcome::Failed(err),
        };
        BinaryReport { binary: binary.to_path_buf(), outcome }
    }

    /// Decompile every regular file directly under `folder`.
    ///
    /// Only failing to list `folder` is an error; per-binary failures are
    /// recorded in the report and never cancel siblings.
    pub fn decompile_folder(
        &self,
        folder: &Path,
        output_dir: &Path,
        progress: &mut dyn BatchProgress,
    ) -> Result<BatchReport, DecompileError> {
        let io_err = |source| DecompileError::Io { path: folder.to_path_buf(), source };
        let mut binaries = Vec::new();
        for entry in fs::read_dir(folder).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if entry.file_type().map_err(io_err)?.is_file() {
                binaries.push(entry.path());
            }
        }
        binaries.sort();
        info!(folder = %folder.display(), binaries = binaries.len(), workers = self.workers, "decompiling folder");
        Ok(self.decompile_all(&binaries, output_dir, progress))
    }

    /// Decompile `binaries`, skipping content duplicates, and block until all are done.
    pub fn decompile_all(
        &self,
        binaries: &[PathBuf],
        output_dir: &Path,
        progress: &mut dyn BatchProgress,
    ) -> BatchReport {
        let total = binaries.len();
        let mut slots: Vec<Option<BinaryReport>> = binaries.iter().map(|_| None).collect();
        let mut completed = 0;

        // Per-run cache: identical content is decompiled once.
        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut jobs = Vec::new();
        for (idx, binary) in binaries.iter().enumerate() {
            let early = match hash_binary(binary) {
                Ok(hash) => match seen.get(&hash) {
                    Some(first) => Some(BinaryOutcome::Duplicate { of: first.clone() }),
                    None => {
                        seen.insert(hash, binary.clone());
                        None
                    }
                },
                Err(source) => {
                    Some(BinaryOutcome::Failed(DecompileError::Io { path: binary.clone(), source }))
                }
            };
            match early {
                Some(outcome) => {
                    let report = BinaryReport { binary: binary.clone(), outcome };
                    completed += 1;
                    progress.on_binary_done(completed, total, &report);
                    slots[idx] = Some(report);
                }
                None => jobs.push((idx, binary.clone())),
            }
        }

        let (job_tx, job_rx) = unbounded::<(usize, PathBuf)>();
        let (result_tx, result_rx) = unbounded::<(usize, BinaryReport)>();
        let workers = self.workers.min(jobs.len());
        for job in jobs {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (idx, binary) in job_rx.iter() {
                        let report = self.decompile_one(&binary, output_dir);
                        if result_tx.send((idx, report)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            for (idx, report) in result_rx.iter() {
                completed += 1;
                if let BinaryOutcome::Failed(err) = &report.outcome {
                    warn!(binary = %report.binary.display(), kind = err.kind(), "decompilation failed: {err}");
                }
                progress.on_binary_done(completed, total, &report);
                slots[idx] = Some(report);
            }
        });

        let binaries = slots
            .into_iter()
            .zip(binaries)
            .map(|(slot, binary)| {
                slot.unwrap_or_else(|| BinaryReport {
                    binary: binary.clone(),
                    outcome: BinaryOutcome::Failed(DecompileError::Spawn(
                        "worker exited before reporting".to_string(),
                    )),
                })
            })
            .collect();
        BatchReport { binaries }
    }
}

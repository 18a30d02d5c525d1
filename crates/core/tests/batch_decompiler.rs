use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use monocle_core::services::corpus::{self, artifact_file_name};
use monocle_core::services::decompiler::{
    BatchDecompiler, BinaryOutcome, BinaryReport, DecompileError, DecompileReport, Decompiler,
};

/// Writes two artifacts per binary; binaries whose content starts with FAIL exit non-zero.
struct FakeDecompiler {
    calls: AtomicUsize,
}

impl FakeDecompiler {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl Decompiler for FakeDecompiler {
    fn decompile(&self, binary: &Path, output_dir: &Path) -> Result<DecompileReport, DecompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = fs::read(binary).map_err(|source| DecompileError::Io { path: binary.into(), source })?;
        if body.starts_with(b"FAIL") {
            return Err(DecompileError::Failed {
                status: "exit status: 1".into(),
                stderr_tail: "import failed".into(),
            });
        }
        let name = binary.file_name().unwrap().to_string_lossy().to_string();
        fs::create_dir_all(output_dir).unwrap();
        for function in ["main", "helper"] {
            fs::write(output_dir.join(artifact_file_name(&name, function, 1_700_000_000)), "int x;").unwrap();
        }
        Ok(DecompileReport {
            binary_path: binary.to_path_buf(),
            binary_hash: String::new(),
            functions: 2,
            elapsed: Duration::from_millis(1),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

fn quiet() -> impl FnMut(usize, usize, &BinaryReport) {
    |_, _, _| {}
}

#[test]
fn one_failing_binary_does_not_cancel_siblings() {
    let temp = tempfile::tempdir().unwrap();
    let bins = temp.path().join("bins");
    let out = temp.path().join("out");
    fs::create_dir_all(&bins).unwrap();
    fs::write(bins.join("alpha"), b"alpha-bytes").unwrap();
    fs::write(bins.join("broken"), b"FAIL-bytes").unwrap();
    fs::write(bins.join("gamma"), b"gamma-bytes").unwrap();

    let batch = BatchDecompiler::new(FakeDecompiler::new(), 3);
    let mut seen = Vec::new();
    let mut progress = |completed: usize, total: usize, report: &BinaryReport| {
        seen.push((completed, total, report.is_failure()));
    };
    let report = batch.decompile_folder(&bins, &out, &mut progress).expect("batch");

    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded(), 2);
    let failures: Vec<&BinaryReport> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].binary.ends_with("broken"));
    assert!(failures[0].describe().contains("import failed"));

    // progress counted every binary exactly once
    let counts: Vec<usize> = seen.iter().map(|(c, _, _)| *c).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    assert!(seen.iter().all(|(_, total, _)| *total == 3));
    assert_eq!(seen.iter().filter(|(_, _, failed)| *failed).count(), 1);

    let loaded = corpus::load(&out).unwrap();
    let mut binaries: Vec<String> = loaded.records.iter().map(|r| r.binary_name.clone()).collect();
    binaries.sort();
    binaries.dedup();
    assert_eq!(binaries, vec!["alpha", "gamma"]);
    assert_eq!(loaded.records.len(), 4);
}

#[test]
fn report_keeps_job_order() {
    let temp = tempfile::tempdir().unwrap();
    let bins = temp.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    for name in ["c", "a", "b"] {
        fs::write(bins.join(name), name.as_bytes()).unwrap();
    }
    fs::create_dir_all(bins.join("subdir")).unwrap();

    let batch = BatchDecompiler::new(FakeDecompiler::new(), 2);
    let report = batch.decompile_folder(&bins, &temp.path().join("out"), &mut quiet()).unwrap();
    let names: Vec<String> =
        report.binaries.iter().map(|b| b.binary.file_name().unwrap().to_string_lossy().to_string()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn identical_binaries_are_decompiled_once() {
    let temp = tempfile::tempdir().unwrap();
    let bins = temp.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    fs::write(bins.join("first"), b"same-bytes").unwrap();
    fs::write(bins.join("second"), b"same-bytes").unwrap();

    let batch = BatchDecompiler::new(FakeDecompiler::new(), 2);
    let report = batch.decompile_folder(&bins, &temp.path().join("out"), &mut quiet()).unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.duplicates(), 1);
    assert_eq!(batch.decompiler().calls.load(Ordering::SeqCst), 1);
    match &report.binaries[1].outcome {
        BinaryOutcome::Duplicate { of } => assert!(of.ends_with("first")),
        other => panic!("expected duplicate, got {other:?}"),
    }
}

#[test]
fn empty_folder_yields_empty_report() {
    let temp = tempfile::tempdir().unwrap();
    let batch = BatchDecompiler::new(FakeDecompiler::new(), 4);
    let report = batch.decompile_folder(temp.path(), &temp.path().join("out"), &mut quiet()).unwrap();
    assert_eq!(report.total(), 0);
}

#[test]
fn missing_folder_is_io_error() {
    let batch = BatchDecompiler::new(FakeDecompiler::new(), 1);
    let err =
        batch.decompile_folder(Path::new("does/not/exist"), Path::new("out"), &mut quiet()).unwrap_err();
    assert!(matches!(err, DecompileError::Io { .. }));
}

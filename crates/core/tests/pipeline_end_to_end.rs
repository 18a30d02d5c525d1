use std::fs;
use std::path::Path;
use std::time::Duration;

use monocle_core::model::Tier;
use monocle_core::services::corpus::artifact_file_name;
use monocle_core::services::decompiler::{
    BatchDecompiler, BinaryReport, DecompileError, DecompileReport, Decompiler,
};
use monocle_core::services::pipeline::{Pipeline, PipelineError};
use monocle_core::services::ranking::RenderedTable;
use monocle_core::services::scoring::{InferenceBackend, InferenceError, ScoringEngine};

/// Emits one artifact per line of the binary (`function:code`); FAIL binaries exit non-zero
/// after leaving a partial artifact behind.
struct LineDecompiler;

impl Decompiler for LineDecompiler {
    fn decompile(&self, binary: &Path, output_dir: &Path) -> Result<DecompileReport, DecompileError> {
        let name = binary.file_name().unwrap().to_string_lossy().to_string();
        let body = fs::read_to_string(binary).unwrap();
        fs::create_dir_all(output_dir).unwrap();
        if body.starts_with("FAIL") {
            fs::write(output_dir.join(artifact_file_name(&name, "partial", 1)), "int partial;").unwrap();
            return Err(DecompileError::Failed { status: "exit status: 1".into(), stderr_tail: String::new() });
        }
        let mut functions = 0;
        for line in body.lines() {
            let (function, code) = line.split_once(':').unwrap();
            fs::write(output_dir.join(artifact_file_name(&name, function, 1_700_000_000)), code).unwrap();
            functions += 1;
        }
        Ok(DecompileReport {
            binary_path: binary.to_path_buf(),
            binary_hash: String::new(),
            functions,
            elapsed: Duration::ZERO,
        })
    }

    fn name(&self) -> &'static str {
        "lines"
    }
}

/// Answers by looking for a marker in the function code embedded in the prompt.
struct KeywordModel;

impl InferenceBackend for KeywordModel {
    fn complete(&mut self, prompt: &str) -> Result<String, InferenceError> {
        if prompt.contains("rc4_ksa") {
            Ok("[INST] ignored [/INST] 7\nLooks like a match".to_string())
        } else if prompt.contains("garbled") {
            Ok("I am not sure what this does".to_string())
        } else if prompt.contains("stall") {
            Err(InferenceError::Timeout(Duration::from_secs(1)))
        } else {
            Ok("0\nno relation".to_string())
        }
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

fn quiet() -> impl FnMut(usize, usize, &BinaryReport) {
    |_, _, _| {}
}

#[test]
fn ranks_matching_function_first() {
    let temp = tempfile::tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(&binary, "foo:void foo() { rc4_ksa(); }\nbar:int bar() { return 0; }").unwrap();
    let out = temp.path().join("decoms");

    let mut pipeline = Pipeline::new(
        BatchDecompiler::new(LineDecompiler, 1),
        ScoringEngine::new(KeywordModel),
    );
    let mut published: Vec<RenderedTable> = Vec::new();
    let mut sink = |table: &RenderedTable| published.push(table.clone());
    let summary = pipeline.run(&binary, "rc4 encryption", &out, &mut quiet(), &mut sink).unwrap();

    assert_eq!(published.len(), 2, "table republished after every result");
    assert_eq!(published[0].rows.len(), 1);

    let table = &summary.ranking;
    assert_eq!(table.title, "Rc4 Encryption");
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0].function_name, "foo");
    assert_eq!(table.rows[0].score, 7);
    assert_eq!(table.rows[0].explanation, "Looks like a match");
    assert_eq!(table.rows[0].tier, Tier::Top);
    assert_eq!(table.rows[1].function_name, "bar");
    assert_eq!(table.rows[1].score, 0);
    assert_eq!(table.rows[1].explanation, "");
    assert_eq!(table.rows[1].tier, Tier::Low);

    assert_eq!(summary.functions_loaded, 2);
    assert_eq!(summary.scored, 2);
    assert_eq!(summary.binaries_decompiled, 1);
    assert!(summary.binaries_failed.is_empty());
}

#[test]
fn scoring_failures_are_isolated_and_counted() {
    let temp = tempfile::tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(
        &binary,
        "a:void a() { rc4_ksa(); }\nb:garbled\nc:stall\nd:int d() { return 0; }",
    )
    .unwrap();

    let mut pipeline = Pipeline::new(
        BatchDecompiler::new(LineDecompiler, 1),
        ScoringEngine::new(KeywordModel),
    );
    let summary = pipeline
        .run(&binary, "rc4", &temp.path().join("decoms"), &mut quiet(), &mut |_: &RenderedTable| {})
        .unwrap();

    assert_eq!(summary.functions_loaded, 4);
    assert_eq!(summary.scored, 2);
    assert_eq!(summary.skipped_unparseable, 1);
    assert_eq!(summary.failed_inference, 1);
    let mut failed: Vec<&str> = summary.score_failures.iter().map(|f| f.function_name.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["b", "c"]);
}

#[test]
fn failed_binary_is_reported_and_siblings_are_scored() {
    let temp = tempfile::tempdir().unwrap();
    let bins = temp.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    fs::write(bins.join("one"), "f1:int f1;").unwrap();
    fs::write(bins.join("two"), "FAIL").unwrap();
    fs::write(bins.join("three"), "f3:int f3;").unwrap();

    let mut pipeline = Pipeline::new(
        BatchDecompiler::new(LineDecompiler, 3),
        ScoringEngine::new(KeywordModel),
    );
    let summary = pipeline
        .run(&bins, "anything", &temp.path().join("decoms"), &mut quiet(), &mut |_: &RenderedTable| {})
        .unwrap();

    assert_eq!(summary.binaries_total, 3);
    assert_eq!(summary.binaries_decompiled, 2);
    assert_eq!(summary.binaries_failed.len(), 1);
    assert!(summary.binaries_failed[0].binary.ends_with("two"));
    assert_eq!(summary.binaries_failed[0].kind, "failed");
    assert_eq!(summary.partial_discarded, 1);

    let mut binaries: Vec<&str> = summary.ranking.rows.iter().map(|r| r.binary_name.as_str()).collect();
    binaries.sort();
    assert_eq!(binaries, vec!["one", "three"]);
    assert!(!summary.nothing_decompiled());
}

#[test]
fn missing_target_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let mut pipeline = Pipeline::new(
        BatchDecompiler::new(LineDecompiler, 1),
        ScoringEngine::new(KeywordModel),
    );
    let err = pipeline
        .run(
            &temp.path().join("missing"),
            "x",
            &temp.path().join("decoms"),
            &mut quiet(),
            &mut |_: &RenderedTable| {},
        )
        .unwrap_err();
    assert!(err.to_string().contains("Binary not found"));
}

#[test]
fn leftover_functions_in_output_dir_are_refused() {
    let temp = tempfile::tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(&binary, "bar:int bar() { return 0; }").unwrap();
    let out = temp.path().join("decoms");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join(artifact_file_name("sample.bin", "stale", 1_600_000_000)), "void stale() { rc4_ksa(); }")
        .unwrap();

    let mut pipeline = Pipeline::new(
        BatchDecompiler::new(LineDecompiler, 1),
        ScoringEngine::new(KeywordModel),
    );
    let err = pipeline.run(&binary, "rc4", &out, &mut quiet(), &mut |_: &RenderedTable| {}).unwrap_err();
    assert!(matches!(err, PipelineError::OutputNotEmpty(ref path) if path == &out), "{err}");
    assert_eq!(fs::read_dir(&out).unwrap().count(), 1, "nothing decompiled into a refused dir");
}

#[test]
fn existing_empty_output_dir_is_accepted() {
    let temp = tempfile::tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(&binary, "foo:void foo() { rc4_ksa(); }").unwrap();
    let out = temp.path().join("decoms");
    fs::create_dir_all(&out).unwrap();

    let mut pipeline = Pipeline::new(
        BatchDecompiler::new(LineDecompiler, 1),
        ScoringEngine::new(KeywordModel),
    );
    let summary = pipeline.run(&binary, "rc4", &out, &mut quiet(), &mut |_: &RenderedTable| {}).unwrap();
    assert_eq!(summary.scored, 1);
}

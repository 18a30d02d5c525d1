#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

fn write_executable(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// analyzeHeadless stand-in: writes `foo` and `bar` for the imported binary,
/// or exits 1 when the binary contains FAIL.
fn fake_headless(dir: &Path) -> PathBuf {
    let path = dir.join("analyzeHeadless");
    write_executable(
        &path,
        r#"#!/bin/sh
binary="$4"
script="$6/$8"
if grep -q FAIL "$binary"; then echo "ERROR: import failed" >&2; exit 1; fi
out=$(sed -n 's/^OUTPUT_DIRECTORY = u"\(.*\)"$/\1/p' "$script")
mkdir -p "$out"
prog=$(basename "$binary")
printf 'void foo(void) { rc4_ksa(); }' > "$out/${prog}__foo__1700000000.c"
printf 'int bar(void) { return 0; }' > "$out/${prog}__bar__1700000000.c"
"#,
    );
    path
}

/// Model stand-in reading the prompt on stdin.
fn fake_model(dir: &Path) -> PathBuf {
    let path = dir.join("model.sh");
    write_executable(
        &path,
        r#"#!/bin/sh
input=$(cat)
case "$input" in
  *rc4_ksa*) printf '7\nLooks like a match\n' ;;
  *) printf '0\nno relation\n' ;;
esac
"#,
    );
    path
}

#[test]
fn find_ranks_matching_function_first() {
    let temp = tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(&binary, b"\x7fELF sample").unwrap();

    let output = cargo_bin_cmd!("monocle")
        .arg("find")
        .arg("--binary")
        .arg(&binary)
        .arg("--find")
        .arg("rc4 encryption")
        .arg("--headless")
        .arg(fake_headless(temp.path()))
        .arg("--model-command")
        .arg(fake_model(temp.path()))
        .arg("--json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let body: serde_json::Value = serde_json::from_slice(&output).expect("summary json");
    assert_eq!(body["scored"], 2);
    assert_eq!(body["binaries_decompiled"], 1);
    let rows = body["ranking"]["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["function_name"], "foo");
    assert_eq!(rows[0]["score"], 7);
    assert_eq!(rows[0]["explanation"], "Looks like a match");
    assert_eq!(rows[0]["tier"], "top");
    assert_eq!(rows[1]["function_name"], "bar");
    assert_eq!(rows[1]["score"], 0);
    assert_eq!(rows[1]["explanation"], "");
    assert_eq!(body["ranking"]["title"], "Rc4 Encryption");
    assert_eq!(body["ranking"]["caption"], "Monocle");
}

#[test]
fn find_keeps_output_when_asked() {
    let temp = tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(&binary, b"sample").unwrap();
    let kept = temp.path().join("kept");

    cargo_bin_cmd!("monocle")
        .arg("find")
        .arg("--binary")
        .arg(&binary)
        .arg("--find")
        .arg("rc4")
        .arg("--headless")
        .arg(fake_headless(temp.path()))
        .arg("--model-command")
        .arg(fake_model(temp.path()))
        .arg("--keep-output")
        .arg(&kept)
        .assert()
        .success()
        .stdout(predicate::str::contains("Functions: 2 scored"));

    let files = fs::read_dir(&kept).unwrap().count();
    assert_eq!(files, 2);
}

#[test]
fn find_refuses_kept_output_with_earlier_functions() {
    let temp = tempdir().unwrap();
    let binary = temp.path().join("sample.bin");
    fs::write(&binary, b"sample").unwrap();
    let kept = temp.path().join("kept");
    fs::create_dir_all(&kept).unwrap();
    fs::write(kept.join("sample.bin__old__1600000000.c"), "void old(void) { rc4_ksa(); }").unwrap();

    cargo_bin_cmd!("monocle")
        .arg("find")
        .arg("--binary")
        .arg(&binary)
        .arg("--find")
        .arg("rc4")
        .arg("--headless")
        .arg(fake_headless(temp.path()))
        .arg("--model-command")
        .arg(fake_model(temp.path()))
        .arg("--keep-output")
        .arg(&kept)
        .arg("--json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not empty"));

    assert_eq!(fs::read_dir(&kept).unwrap().count(), 1);
}

#[test]
fn find_exits_non_zero_when_every_binary_fails() {
    let temp = tempdir().unwrap();
    let bins = temp.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    fs::write(bins.join("broken"), b"FAIL").unwrap();

    cargo_bin_cmd!("monocle")
        .arg("find")
        .arg("--binary")
        .arg(&bins)
        .arg("--find")
        .arg("rc4")
        .arg("--headless")
        .arg(fake_headless(temp.path()))
        .arg("--model-command")
        .arg(fake_model(temp.path()))
        .arg("--json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no binary could be decompiled"));
}

#[test]
fn decompile_writes_functions_for_each_binary() {
    let temp = tempdir().unwrap();
    let bins = temp.path().join("bins");
    fs::create_dir_all(&bins).unwrap();
    fs::write(bins.join("one"), b"one").unwrap();
    fs::write(bins.join("two"), b"FAIL").unwrap();
    let out = temp.path().join("decoms");

    cargo_bin_cmd!("monocle")
        .arg("decompile")
        .arg("--input")
        .arg(&bins)
        .arg("--output")
        .arg(&out)
        .arg("--headless")
        .arg(fake_headless(temp.path()))
        .arg("--jobs")
        .arg("2")
        .assert()
        .success()
        .stdout(predicate::str::contains("Decompiled 1 of 2 binaries"))
        .stdout(predicate::str::contains("Functions on disk: 2"))
        .stderr(predicate::str::contains("[2/2]"));

    assert!(out.join("one__foo__1700000000.c").is_file());
    assert!(out.join("one__bar__1700000000.c").is_file());
}

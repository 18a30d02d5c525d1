use std::fs;

use monocle::absolute_path;
use tempfile::tempdir;

#[test]
fn absolute_path_canonicalizes_existing_dirs() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("nested");
    fs::create_dir_all(&nested).expect("create nested");

    let result = absolute_path(&nested).expect("absolute");
    assert_eq!(result, nested.canonicalize().expect("canonicalize nested"));
}

#[test]
fn absolute_path_keeps_missing_absolute_paths() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("not-yet");
    assert_eq!(absolute_path(&missing).expect("absolute"), missing);
}

#[test]
fn absolute_path_anchors_relative_paths_at_cwd() {
    let result = absolute_path(std::path::Path::new("decoms-that-do-not-exist")).expect("absolute");
    assert!(result.is_absolute());
    assert_eq!(result, std::env::current_dir().unwrap().join("decoms-that-do-not-exist"));
}

use std::fs;
use std::path::{Path, PathBuf};

use crate::services::decompiler::DecompileError;

/// File name the rendered script is written under.
pub const SCRIPT_FILE_NAME: &str = "decom_script.py";

const OUTPUT_DIR_PLACEHOLDER: &str = "{{OUTPUT_DIR}}";
const TEMPLATE: &str = include_str!("../../../templates/save_functions.py");

const fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        let mut j = 0;
        while j < needle.len() && haystack[i + j] == needle[j] {
            j += 1;
        }
        if j == needle.len() {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}

const _: () = assert!(
    count_occurrences(TEMPLATE.as_bytes(), OUTPUT_DIR_PLACEHOLDER.as_bytes()) == 1,
    "save_functions.py must contain exactly one OUTPUT_DIR placeholder"
);

/// Render the export script for `output_dir`.
///
/// The directory is inserted as a quoted unicode literal, so quotes,
/// backslashes and newlines in the path cannot break out of the string.
pub fn generate_script(output_dir: &Path) -> Result<String, DecompileError> {
    let dir = output_dir.to_str().ok_or_else(|| DecompileError::NonUtf8Path(output_dir.into()))?;
    let literal = serde_json::to_string(dir)
        .map_err(|e| DecompileError::Script(format!("failed to quote output dir: {e}")))?;
    Ok(TEMPLATE.replacen(OUTPUT_DIR_PLACEHOLDER, &format!("u{literal}"), 1))
}

/// Render the script for `output_dir` and write it into `script_dir`.
pub fn write_script(script_dir: &Path, output_dir: &Path) -> Result<PathBuf, DecompileError> {
    let script = generate_script(output_dir)?;
    let path = script_dir.join(SCRIPT_FILE_NAME);
    fs::write(&path, script).map_err(|source| DecompileError::Io { path: path.clone(), source })?;
    Ok(path)
}

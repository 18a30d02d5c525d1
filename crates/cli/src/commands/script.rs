use std::path::Path;

use anyhow::{Context, Result};
use monocle_core::services::decompiler::script::generate_script;

use crate::absolute_path;

/// Print the Ghidra export script rendered for `output_dir`.
pub fn script_command(output_dir: &Path) -> Result<()> {
    let output_dir = absolute_path(output_dir)?;
    let script = generate_script(&output_dir)
        .with_context(|| format!("Failed to render script for {}", output_dir.display()))?;
    print!("{script}");
    Ok(())
}

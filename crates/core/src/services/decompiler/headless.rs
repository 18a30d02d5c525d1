use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::DecompilerConfig;
use crate::services::corpus::sanitize_artifact_name;
use crate::services::decompiler::script::{write_script, SCRIPT_FILE_NAME};
use crate::services::decompiler::{DecompileError, DecompileReport, Decompiler};
use crate::services::identify::hash_binary;
use crate::services::process::{run_with_deadline, ProcessError};

/// Env var pointing directly at the analyzeHeadless executable.
pub const HEADLESS_ENV: &str = "GHIDRA_ANALYZE_HEADLESS";
/// Env var pointing at a Ghidra install directory.
pub const INSTALL_DIR_ENV: &str = "GHIDRA_INSTALL_DIR";

fn headless_file_name() -> &'static str {
    if cfg!(windows) {
        "analyzeHeadless.bat"
    } else {
        "analyzeHeadless"
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve the analyzeHeadless executable.
///
/// Precedence:
/// - `explicit` (config file or `--headless`); an invalid explicit path is an error.
/// - `GHIDRA_ANALYZE_HEADLESS` pointing directly to the executable.
/// - `GHIDRA_INSTALL_DIR`, checked under `support/` and at its root.
/// - `analyzeHeadless` on the `PATH`.
pub fn locate_headless(explicit: Option<&Path>) -> Result<PathBuf, DecompileError> {
    resolve_headless(explicit, |key| env::var_os(key), |name| which::which(name).ok())
}

pub(crate) fn resolve_headless(
    explicit: Option<&Path>,
    env_lookup: impl Fn(&str) -> Option<OsString>,
    path_lookup: impl Fn(&str) -> Option<PathBuf>,
) -> Result<PathBuf, DecompileError> {
    if let Some(path) = explicit {
        return if is_executable(path) {
            Ok(path.to_path_buf())
        } else {
            Err(DecompileError::ToolNotFound(format!(
                "configured path {} is not an executable file",
                path.display()
            )))
        };
    }

    if let Some(p) = env_lookup(HEADLESS_ENV) {
        let path = PathBuf::from(p);
        if is_executable(&path) {
            return Ok(path);
        }
        warn!(path = %path.display(), "{HEADLESS_ENV} is set but not executable; ignoring");
    }

    if let Some(dir) = env_lookup(INSTALL_DIR_ENV) {
        let dir = PathBuf::from(dir);
        for candidate in [dir.join("support").join(headless_file_name()), dir.join(headless_file_name())]
        {
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    if let Some(path) = path_lookup(headless_file_name()) {
        return Ok(path);
    }

    Err(DecompileError::ToolNotFound(format!(
        "set decompiler.headless_path, {HEADLESS_ENV} or {INSTALL_DIR_ENV}, or put {} on the PATH",
        headless_file_name()
    )))
}

/// Drives `analyzeHeadless` once per binary inside a throwaway workspace.
#[derive(Debug, Clone)]
pub struct HeadlessDriver {
    headless: PathBuf,
    timeout: Option<Duration>,
    analysis_timeout_per_file: Option<u64>,
}

impl HeadlessDriver {
    pub fn new(headless: impl Into<PathBuf>) -> Self {
        Self { headless: headless.into(), timeout: None, analysis_timeout_per_file: None }
    }

    /// Locate the executable per `config` and apply its deadlines.
    pub fn from_config(config: &DecompilerConfig) -> Result<Self, DecompileError> {
        let headless = locate_headless(config.headless_path.as_deref())?;
        info!(headless = %headless.display(), "using Ghidra headless analyzer");
        Ok(Self {
            headless,
            timeout: config.timeout(),
            analysis_timeout_per_file: config.analysis_timeout_per_file,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the analyzeHeadless invocation for one binary.
    ///
    /// The project name is the binary hash, so every import gets its own project.
    pub fn build_command(
        &self,
        project_dir: &Path,
        binary: &Path,
        script_dir: &Path,
        binary_hash: &str,
    ) -> Command {
        let mut cmd = Command::new(&self.headless);
        cmd.arg(project_dir)
            .arg(binary_hash)
            .arg("-import")
            .arg(binary)
            .arg("-scriptPath")
            .arg(script_dir)
            .arg("-postScript")
            .arg(SCRIPT_FILE_NAME);
        if let Some(secs) = self.analysis_timeout_per_file {
            cmd.arg("-analysisTimeoutPerFile").arg(secs.to_string());
        }
        cmd
    }

    /// Run one import + export. The scratch workspace is removed on return,
    /// whatever the outcome.
    fn invoke(&self, binary: &Path, output_dir: &Path, binary_hash: &str) -> Result<(), DecompileError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| DecompileError::Io { path, source }
        };

        let workspace = tempfile::Builder::new()
            .prefix("monocle-ghidra-")
            .tempdir()
            .map_err(io_err(&env::temp_dir()))?;
        let script_dir = workspace.path().join("script");
        let project_dir = workspace.path().join("project");
        fs::create_dir_all(&script_dir).map_err(io_err(&script_dir))?;
        fs::create_dir_all(&project_dir).map_err(io_err(&project_dir))?;
        write_script(&script_dir, output_dir)?;

        let command = self.build_command(&project_dir, binary, &script_dir, binary_hash);
        debug!(?command, "running analyzeHeadless");

        let output = run_with_deadline(command, None, self.timeout).map_err(|e| match e {
            ProcessError::Timeout { after, .. } => DecompileError::Timeout(after),
            other => DecompileError::Spawn(other.to_string()),
        })?;

        if !output.status.success() {
            return Err(DecompileError::Failed {
                status: output.status.to_string(),
                stderr_tail: output.stderr_tail(10),
            });
        }
        Ok(())
    }
}

/// Names of the artifacts in `output_dir` that belong to `program_name`.
pub(crate) fn artifact_names(output_dir: &Path, program_name: &str) -> HashSet<OsString> {
    let prefix = format!("{}__", sanitize_artifact_name(program_name));
    fs::read_dir(output_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name())
                .filter(|name| name.to_string_lossy().starts_with(&prefix))
                .collect()
        })
        .unwrap_or_default()
}

impl Decompiler for HeadlessDriver {
    fn decompile(&self, binary: &Path, output_dir: &Path) -> Result<DecompileReport, DecompileError> {
        if !binary.is_file() {
            return Err(DecompileError::MissingBinary(binary.to_path_buf()));
        }
        let started = Instant::now();
        let binary_hash =
            hash_binary(binary).map_err(|source| DecompileError::Io { path: binary.into(), source })?;

        // Ghidra names the program after the imported file.
        let program_name =
            binary.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let existing = artifact_names(output_dir, &program_name);

        self.invoke(binary, output_dir, &binary_hash)?;

        let functions = artifact_names(output_dir, &program_name).difference(&existing).count();
        if functions == 0 {
            return Err(DecompileError::NoOutput(program_name));
        }

        let elapsed = started.elapsed();
        info!(binary = %binary.display(), functions, elapsed_secs = elapsed.as_secs_f64(), "decompiled");
        Ok(DecompileReport { binary_path: binary.to_path_buf(), binary_hash, functions, elapsed })
    }

    fn name(&self) -> &'static str {
        "ghidra-headless"
    }
}

use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Last `max_lines` lines of stderr, for error messages.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} did not finish within {}s and was killed", .after.as_secs())]
    Timeout { program: String, after: Duration },
    #[error("failed while waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Kills the child's whole process tree if it is dropped before being reaped.
///
/// Launchers such as `analyzeHeadless` start the real work in grandchildren,
/// so killing only the direct child would leave them running.
struct ChildGuard {
    child: Child,
    reaped: bool,
    #[cfg(unix)]
    _registration: Option<interrupt::Registration>,
}

impl ChildGuard {
    fn new(child: Child) -> Self {
        Self {
            #[cfg(unix)]
            _registration: interrupt::Registration::new(child.id()),
            child,
            reaped: false,
        }
    }

    fn kill(&mut self) {
        kill_tree(&mut self.child);
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill();
        }
    }
}

/// Start the child as the leader of a new process group.
#[cfg(unix)]
fn isolate(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_command: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The child leads its own group, so its pid is the group id.
    if killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL).is_err() {
        let _ = child.kill();
    }
}

#[cfg(windows)]
fn kill_tree(child: &mut Child) {
    let killed = Command::new("taskkill")
        .args(["/T", "/F", "/PID", &child.id().to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if !killed {
        let _ = child.kill();
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(child: &mut Child) {
    let _ = child.kill();
}

/// Process groups started here leave the terminal's foreground group, so
/// Ctrl-C no longer reaches them. Frontends call [`kill_children_on_interrupt`]
/// to forward SIGINT and SIGTERM as a kill of every live group.
#[cfg(unix)]
mod interrupt {
    use std::os::raw::c_int;
    use std::sync::atomic::{AtomicI32, Ordering};

    use nix::sys::signal::{killpg, raise, sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use nix::unistd::Pid;

    const SLOTS: usize = 256;
    #[allow(clippy::declare_interior_mutable_const)]
    const EMPTY: AtomicI32 = AtomicI32::new(0);
    static LIVE_GROUPS: [AtomicI32; SLOTS] = [EMPTY; SLOTS];

    /// Slot holding one live process group; cleared on drop.
    pub(super) struct Registration(usize);

    impl Registration {
        pub(super) fn new(pgid: u32) -> Option<Self> {
            let pgid = pgid as i32;
            LIVE_GROUPS.iter().enumerate().find_map(|(idx, slot)| {
                slot.compare_exchange(0, pgid, Ordering::SeqCst, Ordering::SeqCst).ok().map(|_| Registration(idx))
            })
        }
    }

    impl Drop for Registration {
        fn drop(&mut self) {
            LIVE_GROUPS[self.0].store(0, Ordering::SeqCst);
        }
    }

    extern "C" fn on_signal(signum: c_int) {
        for slot in LIVE_GROUPS.iter() {
            let pgid = slot.load(Ordering::SeqCst);
            if pgid > 0 {
                let _ = killpg(Pid::from_raw(pgid), Signal::SIGKILL);
            }
        }
        // Restore the default action and re-deliver so the process still dies.
        if let Ok(signal) = Signal::try_from(signum) {
            let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
            // SAFETY: installing the default disposition is async-signal-safe.
            unsafe {
                let _ = sigaction(signal, &default);
            }
            let _ = raise(signal);
        }
    }

    pub(super) fn install() -> nix::Result<()> {
        let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            // SAFETY: the handler only touches atomics and calls killpg, sigaction and raise.
            unsafe { sigaction(signal, &action) }?;
        }
        Ok(())
    }
}

/// Kill every running subprocess tree when this process gets SIGINT or SIGTERM.
///
/// A no-op on platforms without process groups.
pub fn kill_children_on_interrupt() -> io::Result<()> {
    #[cfg(unix)]
    interrupt::install().map_err(io::Error::from)?;
    Ok(())
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// `input`, when given, is written to the child's stdin which is then closed.
/// With a `timeout`, the child is killed once the deadline passes and
/// [`ProcessError::Timeout`] is returned. A non-zero exit is *not* an error
/// here; callers inspect `status`.
pub fn run_with_deadline(
    mut command: Command,
    input: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<ProcessOutput, ProcessError> {
    let program = command.get_program().to_string_lossy().to_string();
    isolate(&mut command);
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let child = command
        .spawn()
        .map_err(|source| ProcessError::Spawn { program: program.clone(), source })?;
    let mut guard = ChildGuard::new(child);

    // Stdin is fed from its own thread so a child that answers before reading
    // everything cannot deadlock against a full pipe.
    if let (Some(mut stdin), Some(bytes)) = (guard.child.stdin.take(), input) {
        let bytes = bytes.to_vec();
        thread::spawn(move || {
            let _ = stdin.write_all(&bytes);
        });
    }
    let stdout = guard.child.stdout.take().map(spawn_reader);
    let stderr = guard.child.stderr.take().map(spawn_reader);

    let started = Instant::now();
    let status = loop {
        match guard.child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                guard.kill();
                return Err(ProcessError::Wait { program, source });
            }
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                guard.kill();
                // Reader threads are detached; a descendant that escaped the group may still hold the pipes.
                return Err(ProcessError::Timeout { program, after: limit });
            }
        }
        thread::sleep(POLL_INTERVAL);
    };
    guard.reaped = true;

    let join = |handle: Option<JoinHandle<Vec<u8>>>| {
        handle.and_then(|h| h.join().ok()).unwrap_or_default()
    };
    Ok(ProcessOutput { status, stdout: join(stdout), stderr: join(stderr) })
}

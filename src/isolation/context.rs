//! Isolated execution context lifecycle
//!
//! An [`IsolatedContext`] owns one `isotest-runner` child process: spawned
//! with its working directory at the test module's base directory, control
//! pipes on stdin/stdout, and the probe-path list on its command line.
//! Contexts are created per run and destroyed per run, never reused.
//!
//! Teardown is graceful-then-forceful: a shutdown request, a bounded wait,
//! and a kill if the child does not exit. Dropping a context that was never
//! torn down kills the child outright, so no exit path leaks a process.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{IsolationError, Result};
use crate::protocol::{self, Request, Response};

/// Distinguishes context names within one host process. Diagnostic only.
static CONTEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// How long teardown waits for the child after requesting shutdown before
/// killing it.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything needed to stand up an isolated context.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// The test module's containing directory; becomes the child's working
    /// directory.
    pub base_dir: PathBuf,
    /// Optional context-local configuration file for the runner.
    pub config_file: Option<PathBuf>,
    /// Ordered fallback probe paths, passed to the child at startup.
    pub probe_paths: Vec<PathBuf>,
    /// Explicit runner executable; defaults to `isotest-runner` next to the
    /// host executable.
    pub runner_program: Option<PathBuf>,
}

/// A separate execution universe: one child runner process plus its control
/// channel.
pub struct IsolatedContext {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr_drain: Option<thread::JoinHandle<()>>,
    torn_down: bool,
}

impl IsolatedContext {
    /// Spawn the runner child process described by `options`.
    pub fn create(options: &ContextOptions) -> Result<Self> {
        let name = format!(
            "isotest-ctx-{}-{}",
            std::process::id(),
            CONTEXT_SEQ.fetch_add(1, Ordering::SeqCst)
        );

        let program = match &options.runner_program {
            Some(program) => program.clone(),
            None => default_runner_program()?,
        };

        let mut command = Command::new(&program);
        command
            .arg("--context-name")
            .arg(&name)
            .current_dir(&options.base_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(config) = &options.config_file {
            command.arg("--config").arg(config);
        }
        for path in &options.probe_paths {
            command.arg("--probe-path").arg(path);
        }

        let mut child = command.spawn().map_err(|e| {
            IsolationError::Context(format!(
                "failed to spawn runner `{}`: {e}",
                program.display()
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IsolationError::Context("runner stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| IsolationError::Context("runner stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| IsolationError::Context("runner stderr unavailable".to_string()))?;

        // The child's own diagnostics arrive on its stderr; drain them into
        // host tracing so a blocked pipe can never stall the run.
        let drain_name = name.clone();
        let stderr_drain = thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(line) => tracing::debug!(context = %drain_name, "{line}"),
                    Err(_) => break,
                }
            }
        });

        tracing::debug!(
            context = %name,
            base_dir = %options.base_dir.display(),
            "isolated context created"
        );

        Ok(Self {
            name,
            child,
            stdin: Some(stdin),
            stdout,
            stderr_drain: Some(stderr_drain),
            torn_down: false,
        })
    }

    /// Diagnostic name of this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one request over the control channel.
    pub fn send(&mut self, request: &Request) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            IsolationError::Context(format!(
                "control channel of context `{}` is already closed",
                self.name
            ))
        })?;
        protocol::write_message(stdin, request)
    }

    /// Receive the next response; a closed channel is a context failure.
    pub fn receive(&mut self) -> Result<Response> {
        protocol::read_message(&mut self.stdout)?.ok_or_else(|| {
            IsolationError::Context(format!(
                "isolated context `{}` closed its control channel",
                self.name
            ))
        })
    }

    /// Destroy the context: request shutdown, wait briefly, kill if needed.
    ///
    /// Always reaps the child. Returns an error if the child had to be
    /// killed or could not be reaped, so callers can surface teardown
    /// problems after their own cleanup.
    pub fn teardown(mut self) -> Result<()> {
        // Best-effort shutdown request; dropping stdin right after also
        // hands the child an end-of-input signal. The acknowledgment is
        // deliberately never read: a hung child would park an unbounded
        // receive forever, and the bounded wait below covers the
        // cooperative case.
        if let Some(mut stdin) = self.stdin.take() {
            if let Err(e) = protocol::write_message(&mut stdin, &Request::Shutdown) {
                tracing::debug!(context = %self.name, error = %e, "shutdown request not delivered");
            }
        }

        let deadline = Instant::now() + TEARDOWN_GRACE;
        let exited = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        break None;
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    // Child state unknown; leave `torn_down` unset so the
                    // drop kill still runs.
                    return Err(IsolationError::Context(format!(
                        "failed to wait for context `{}`: {e}",
                        self.name
                    )));
                }
            }
        };

        let outcome = match exited {
            Some(status) => {
                tracing::debug!(context = %self.name, %status, "isolated context unloaded");
                Ok(())
            }
            None => {
                let killed = self.child.kill();
                let _ = self.child.wait();
                match killed {
                    Ok(()) => Err(IsolationError::Context(format!(
                        "context `{}` did not shut down and was killed",
                        self.name
                    ))),
                    Err(e) => Err(IsolationError::Context(format!(
                        "failed to kill unresponsive context `{}`: {e}",
                        self.name
                    ))),
                }
            }
        };
        self.torn_down = true;

        // The drain thread ends only once the child's stderr closes; join
        // it after the child has exited or been killed, never before.
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }

        outcome
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        // Teardown was skipped (early error on the host side); make sure the
        // child cannot outlive the context.
        if let Err(e) = self.child.kill() {
            tracing::debug!(context = %self.name, error = %e, "kill on drop failed");
        }
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_drain.take() {
            let _ = handle.join();
        }
        tracing::debug!(context = %self.name, "isolated context killed on drop");
    }
}

/// Locate the runner binary: next to the host executable, or one level up
/// when the host is a test binary living in `target/<profile>/deps`.
fn default_runner_program() -> Result<PathBuf> {
    let runner_file = format!("isotest-runner{}", std::env::consts::EXE_SUFFIX);
    let exe = std::env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| {
        IsolationError::Context("host executable has no containing directory".to_string())
    })?;

    let mut candidates = vec![dir.join(&runner_file)];
    if dir.ends_with("deps") {
        if let Some(parent) = dir.parent() {
            candidates.push(parent.join(&runner_file));
        }
    }

    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            IsolationError::Context(format!(
                "runner binary `{runner_file}` not found next to the host executable"
            ))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::fs;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_dir() -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        let dir = std::env::temp_dir().join(format!("isotest_context_test_{pid}_{id}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    #[cfg(unix)]
    fn test_teardown_kills_unresponsive_child_within_grace() {
        use std::os::unix::fs::PermissionsExt;

        // A "runner" that ignores the control channel entirely and never
        // exits on its own.
        let dir = unique_temp_dir();
        let program = dir.join("stalling-runner");
        fs::write(&program, "#!/bin/sh\nexec sleep 60\n").unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        let options = ContextOptions {
            base_dir: dir.clone(),
            config_file: None,
            probe_paths: Vec::new(),
            runner_program: Some(program),
        };
        let context = IsolatedContext::create(&options).unwrap();

        let started = Instant::now();
        let outcome = context.teardown();
        let elapsed = started.elapsed();

        assert!(matches!(outcome, Err(IsolationError::Context(_))));
        assert!(
            elapsed < TEARDOWN_GRACE + Duration::from_secs(3),
            "teardown took {elapsed:?}"
        );

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_context_names_are_distinct() {
        let a = CONTEXT_SEQ.fetch_add(1, Ordering::SeqCst);
        let b = CONTEXT_SEQ.fetch_add(1, Ordering::SeqCst);
        assert_ne!(a, b);
    }

    #[test]
    fn test_spawn_failure_is_a_context_error() {
        let options = ContextOptions {
            base_dir: std::env::temp_dir(),
            config_file: None,
            probe_paths: Vec::new(),
            runner_program: Some(PathBuf::from("/nonexistent/isotest-runner")),
        };
        assert!(matches!(
            IsolatedContext::create(&options),
            Err(IsolationError::Context(_))
        ));
    }
}

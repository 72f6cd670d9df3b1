//! Isolation coordinator - the public run contract
//!
//! `run_test` stands up an isolated context rooted at the test module's
//! directory, redirects the host's working directory there, drives the
//! remote runner (configure, build-suite, run), and unconditionally restores
//! the working directory and tears the context down on every exit path.
//!
//! The working-directory redirection is process-wide shared mutable state:
//! `run_test` takes `&mut self` and assumes at most one invocation is in
//! flight per process. Serialization across coordinators is the caller's
//! responsibility.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{IsolationError, Result};
use crate::events::TestEventListener;
use crate::isolation::context::{ContextOptions, IsolatedContext};
use crate::isolation::proxy::RunnerProxy;
use crate::resolver::assemble_probe_paths;
use crate::settings::HostSettings;
use crate::suite::TestRunResult;

// ============================================================================
// Run request
// ============================================================================

/// Immutable description of one test run.
#[derive(Debug, Clone)]
pub struct TestRunRequest {
    module_file: PathBuf,
    config_file: Option<PathBuf>,
    test_name: Option<String>,
}

impl TestRunRequest {
    /// Build a request for `module_file`, which must exist. The path is
    /// canonicalized so its containing directory is always resolvable.
    pub fn new(module_file: impl Into<PathBuf>) -> Result<Self> {
        let module_file = module_file.into();
        if !module_file.is_file() {
            return Err(IsolationError::ModuleNotFound { path: module_file });
        }
        let module_file = module_file
            .canonicalize()
            .map_err(|_| IsolationError::ModuleNotFound {
                path: module_file.clone(),
            })?;
        Ok(Self {
            module_file,
            config_file: None,
            test_name: None,
        })
    }

    /// Context-local configuration file for the runner.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Run only the named test case instead of the full suite.
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    pub fn module_file(&self) -> &Path {
        &self.module_file
    }

    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    pub fn test_name(&self) -> Option<&str> {
        self.test_name.as_deref()
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Drives one isolated test run at a time.
///
/// Constructed with the two text sinks that receive the suite's captured
/// standard output and standard error; the listener is supplied per run.
pub struct IsolationCoordinator {
    settings: HostSettings,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    runner_program: Option<PathBuf>,
}

impl IsolationCoordinator {
    pub fn new(settings: HostSettings, out: Box<dyn Write>, err: Box<dyn Write>) -> Self {
        Self {
            settings,
            out,
            err,
            runner_program: None,
        }
    }

    /// Coordinator with settings taken from the process environment.
    pub fn from_environment(out: Box<dyn Write>, err: Box<dyn Write>) -> Result<Self> {
        Ok(Self::new(HostSettings::from_environment()?, out, err))
    }

    /// Use an explicit runner executable instead of locating `isotest-runner`
    /// next to the host binary.
    pub fn with_runner_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.runner_program = Some(program.into());
        self
    }

    /// Run the suite described by `request` inside a fresh isolated context.
    ///
    /// Guarantees, for every outcome:
    /// - the host working directory is restored before returning;
    /// - the isolated context is destroyed whenever one was created;
    /// - failures propagate only after that cleanup has happened.
    pub fn run_test(
        &mut self,
        request: &TestRunRequest,
        listener: &mut dyn TestEventListener,
    ) -> Result<TestRunResult> {
        // Precondition check; fails before any side effect. The request
        // validated the path at construction, but the file may have vanished
        // since.
        if !request.module_file().is_file() {
            return Err(IsolationError::ModuleNotFound {
                path: request.module_file().to_path_buf(),
            });
        }
        let base_dir = request
            .module_file()
            .parent()
            .ok_or_else(|| {
                IsolationError::Context("test module has no containing directory".to_string())
            })?
            .to_path_buf();
        let file_name = request
            .module_file()
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                IsolationError::Context("test module file name is not valid UTF-8".to_string())
            })?
            .to_string();

        let probe_paths = assemble_probe_paths(&self.settings);

        let options = ContextOptions {
            base_dir: base_dir.clone(),
            config_file: request.config_file().map(Path::to_path_buf),
            probe_paths,
            runner_program: self.runner_program.clone(),
        };
        let mut context = IsolatedContext::create(&options)?;

        // The guard scope is the try block; its drop is the paired restore.
        let run_outcome = {
            let _cwd = match CwdGuard::enter(&base_dir) {
                Ok(guard) => guard,
                Err(e) => {
                    // Context exists but the redirection never happened;
                    // tear down before surfacing the failure.
                    teardown_after_failure(context);
                    return Err(e);
                }
            };
            self.drive(&mut context, &file_name, request.test_name(), listener)
        };

        let context_name = context.name().to_string();
        let teardown_outcome = context.teardown();

        match (run_outcome, teardown_outcome) {
            (Ok(result), Ok(())) => Ok(result),
            // Teardown is an isolation-facility failure in its own right
            // when the run itself succeeded.
            (Ok(_), Err(teardown_err)) => Err(teardown_err),
            (Err(run_err), Ok(())) => Err(run_err),
            (Err(run_err), Err(teardown_err)) => {
                tracing::warn!(
                    context = %context_name,
                    error = %teardown_err,
                    "context teardown failed while handling a run failure"
                );
                Err(run_err)
            }
        }
    }

    fn drive(
        &mut self,
        context: &mut IsolatedContext,
        file_name: &str,
        test_name: Option<&str>,
        listener: &mut dyn TestEventListener,
    ) -> Result<TestRunResult> {
        let mut runner = RunnerProxy::new(context);
        runner.set_test_file_name(file_name);
        if let Some(name) = test_name {
            runner.set_test_name(name);
        }
        runner.build_suite()?;
        runner.run(listener, &mut *self.out, &mut *self.err)
    }
}

fn teardown_after_failure(context: IsolatedContext) {
    let name = context.name().to_string();
    if let Err(e) = context.teardown() {
        tracing::warn!(context = %name, error = %e, "context teardown failed");
    }
}

// ============================================================================
// Working-directory guard
// ============================================================================

/// Scoped redirection of the process working directory. The saved directory
/// is restored on drop, making the pairing of redirect and restore
/// statically evident.
struct CwdGuard {
    saved: PathBuf,
}

impl CwdGuard {
    fn enter(target: &Path) -> Result<Self> {
        let saved = std::env::current_dir()?;
        std::env::set_current_dir(target).map_err(|e| {
            IsolationError::Context(format!(
                "cannot change working directory to `{}`: {e}",
                target.display()
            ))
        })?;
        Ok(Self { saved })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.saved) {
            tracing::warn!(
                dir = %self.saved.display(),
                error = %e,
                "failed to restore working directory"
            );
        }
    }
}

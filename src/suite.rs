//! Suite payloads and the runner seam
//!
//! The actual test-runner library is an external collaborator: this crate
//! only needs something that can build a suite and run it while streaming
//! events. That seam is the [`SuiteRunner`] trait; [`ManifestRunner`] is the
//! reference implementation, driven by the declarative [`SuiteManifest`]
//! embedded in a module artifact's payload. Assertion semantics live behind
//! the seam and are out of scope here.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{IsolationError, Result};
use crate::module::ModuleIdentity;

// ============================================================================
// Suite manifest (module payload)
// ============================================================================

/// The suite definition a test module carries in its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteManifest {
    /// Test cases in declaration order.
    pub tests: Vec<TestCaseDef>,
    /// Modules this suite needs loaded before it can be built. Resolved by
    /// the child's loader, falling back to the probe-path scan.
    #[serde(default)]
    pub requires: Vec<ModuleIdentity>,
}

impl SuiteManifest {
    /// Decode a manifest from a module artifact payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encode the manifest into payload bytes.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// A single declared test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseDef {
    pub name: String,
    pub behavior: TestBehavior,
    /// Text the test writes to standard output when executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Text the test writes to standard error when executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

/// Declared outcome of a test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestBehavior {
    Pass,
    Fail { message: String },
    Skip { reason: String },
}

// ============================================================================
// Run results (opaque pass-through values)
// ============================================================================

/// Terminal status of a single test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed { message: String },
    Skipped { reason: String },
}

/// Outcome of one executed (or skipped) test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
}

/// Result of a whole run. The host treats this as a pass-through value for
/// the reporting collaborator; it is never interpreted by the isolation core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestRunResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub outcomes: Vec<TestOutcome>,
}

impl TestRunResult {
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Events streamed while a suite runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted { test_count: usize },
    TestStarted { name: String },
    Output { text: String },
    ErrorOutput { text: String },
    TestFinished { outcome: TestOutcome },
}

// ============================================================================
// Runner seam
// ============================================================================

/// A runner that can assemble a suite and execute it.
///
/// `build_suite` must be called before `run`; implementations return the
/// number of runnable tests from the build step.
pub trait SuiteRunner {
    fn build_suite(&mut self) -> Result<usize>;

    fn run(&mut self, emit: &mut dyn FnMut(RunEvent)) -> Result<TestRunResult>;
}

/// Reference [`SuiteRunner`] interpreting a declarative [`SuiteManifest`].
pub struct ManifestRunner {
    manifest: SuiteManifest,
    selection: Option<String>,
    fail_fast: bool,
    capture_output: bool,
    built: Option<Vec<TestCaseDef>>,
}

impl ManifestRunner {
    /// Create a runner over `manifest`, optionally restricted to the single
    /// test case named by `selection`.
    pub fn new(manifest: SuiteManifest, selection: Option<String>) -> Self {
        Self {
            manifest,
            selection,
            fail_fast: false,
            capture_output: true,
            built: None,
        }
    }

    /// Stop executing after the first failure; remaining tests are reported
    /// as skipped.
    pub fn fail_fast(mut self, enabled: bool) -> Self {
        self.fail_fast = enabled;
        self
    }

    /// Whether declared stdout/stderr text is streamed as output events.
    pub fn capture_output(mut self, enabled: bool) -> Self {
        self.capture_output = enabled;
        self
    }

    fn execute(test: &TestCaseDef, started: Instant) -> TestOutcome {
        let status = match &test.behavior {
            TestBehavior::Pass => TestStatus::Passed,
            TestBehavior::Fail { message } => TestStatus::Failed {
                message: message.clone(),
            },
            TestBehavior::Skip { reason } => TestStatus::Skipped {
                reason: reason.clone(),
            },
        };
        TestOutcome {
            name: test.name.clone(),
            status,
            duration_ms: duration_ms(started),
        }
    }
}

impl SuiteRunner for ManifestRunner {
    fn build_suite(&mut self) -> Result<usize> {
        let tests = match &self.selection {
            Some(name) => {
                let selected: Vec<TestCaseDef> = self
                    .manifest
                    .tests
                    .iter()
                    .filter(|t| t.name == *name)
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    return Err(IsolationError::SuiteBuild(format!(
                        "no test case named `{name}` in suite"
                    )));
                }
                selected
            }
            None => self.manifest.tests.clone(),
        };

        let count = tests.len();
        self.built = Some(tests);
        Ok(count)
    }

    fn run(&mut self, emit: &mut dyn FnMut(RunEvent)) -> Result<TestRunResult> {
        let tests = self
            .built
            .clone()
            .ok_or_else(|| IsolationError::Run("run requested before build-suite".to_string()))?;

        let run_started = Instant::now();
        let mut result = TestRunResult {
            total: tests.len(),
            ..TestRunResult::default()
        };

        emit(RunEvent::RunStarted {
            test_count: tests.len(),
        });

        let mut halted = false;
        for test in &tests {
            let outcome = if halted {
                TestOutcome {
                    name: test.name.clone(),
                    status: TestStatus::Skipped {
                        reason: "not run: earlier failure stopped the suite".to_string(),
                    },
                    duration_ms: 0,
                }
            } else {
                emit(RunEvent::TestStarted {
                    name: test.name.clone(),
                });
                if self.capture_output {
                    if let Some(text) = &test.stdout {
                        emit(RunEvent::Output { text: text.clone() });
                    }
                    if let Some(text) = &test.stderr {
                        emit(RunEvent::ErrorOutput { text: text.clone() });
                    }
                }
                Self::execute(test, Instant::now())
            };

            match &outcome.status {
                TestStatus::Passed => result.passed += 1,
                TestStatus::Failed { .. } => {
                    result.failed += 1;
                    if self.fail_fast {
                        halted = true;
                    }
                }
                TestStatus::Skipped { .. } => result.skipped += 1,
            }

            emit(RunEvent::TestFinished {
                outcome: outcome.clone(),
            });
            result.outcomes.push(outcome);
        }

        result.duration_ms = duration_ms(run_started);
        Ok(result)
    }
}

fn duration_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manifest(names: &[(&str, TestBehavior)]) -> SuiteManifest {
        SuiteManifest {
            tests: names
                .iter()
                .map(|(name, behavior)| TestCaseDef {
                    name: (*name).to_string(),
                    behavior: behavior.clone(),
                    stdout: None,
                    stderr: None,
                })
                .collect(),
            requires: Vec::new(),
        }
    }

    fn collect_events(runner: &mut ManifestRunner) -> (TestRunResult, Vec<RunEvent>) {
        let mut events = Vec::new();
        let result = runner.run(&mut |event| events.push(event)).unwrap();
        (result, events)
    }

    #[test]
    fn test_build_full_suite() {
        let mut runner = ManifestRunner::new(
            manifest(&[("a", TestBehavior::Pass), ("b", TestBehavior::Pass)]),
            None,
        );
        assert_eq!(runner.build_suite().unwrap(), 2);
    }

    #[test]
    fn test_build_selects_single_test() {
        let mut runner = ManifestRunner::new(
            manifest(&[("suite.x", TestBehavior::Pass), ("suite.y", TestBehavior::Pass)]),
            Some("suite.y".to_string()),
        );
        assert_eq!(runner.build_suite().unwrap(), 1);
        let (result, _) = collect_events(&mut runner);
        assert_eq!(result.total, 1);
        assert_eq!(result.outcomes[0].name, "suite.y");
    }

    #[test]
    fn test_build_fails_on_unknown_selection() {
        let mut runner = ManifestRunner::new(
            manifest(&[("suite.x", TestBehavior::Pass)]),
            Some("suite.missing".to_string()),
        );
        assert!(matches!(
            runner.build_suite(),
            Err(IsolationError::SuiteBuild(_))
        ));
    }

    #[test]
    fn test_run_counts_statuses() {
        let mut runner = ManifestRunner::new(
            manifest(&[
                ("ok", TestBehavior::Pass),
                (
                    "broken",
                    TestBehavior::Fail {
                        message: "expected 2, got 3".to_string(),
                    },
                ),
                (
                    "later",
                    TestBehavior::Skip {
                        reason: "platform".to_string(),
                    },
                ),
            ]),
            None,
        );
        runner.build_suite().unwrap();
        let (result, events) = collect_events(&mut runner);

        assert_eq!(result.total, 3);
        assert_eq!(result.passed, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert!(result.has_failures());

        let started: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, RunEvent::TestStarted { .. }))
            .collect();
        assert_eq!(started.len(), 3);
    }

    #[test]
    fn test_run_before_build_is_an_error() {
        let mut runner = ManifestRunner::new(manifest(&[("a", TestBehavior::Pass)]), None);
        assert!(matches!(
            runner.run(&mut |_| {}),
            Err(IsolationError::Run(_))
        ));
    }

    #[test]
    fn test_fail_fast_skips_remaining_tests() {
        let mut runner = ManifestRunner::new(
            manifest(&[
                (
                    "first",
                    TestBehavior::Fail {
                        message: "boom".to_string(),
                    },
                ),
                ("second", TestBehavior::Pass),
                ("third", TestBehavior::Pass),
            ]),
            None,
        )
        .fail_fast(true);
        runner.build_suite().unwrap();
        let (result, _) = collect_events(&mut runner);

        assert_eq!(result.failed, 1);
        assert_eq!(result.passed, 0);
        assert_eq!(result.skipped, 2);
    }

    #[test]
    fn test_declared_output_is_streamed() {
        let mut suite = manifest(&[("noisy", TestBehavior::Pass)]);
        suite.tests[0].stdout = Some("hello from the test\n".to_string());
        let mut runner = ManifestRunner::new(suite, None);
        runner.build_suite().unwrap();
        let (_, events) = collect_events(&mut runner);

        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::Output { text } if text.contains("hello"))));
    }
}

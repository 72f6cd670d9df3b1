//! Listener seam for run notifications
//!
//! The caller supplies a listener; the coordinator threads streamed run
//! events into it without interpreting them. All hooks default to no-ops so
//! listeners implement only what they need.

use crate::suite::{TestOutcome, TestRunResult};

/// Receives test lifecycle notifications during a run.
pub trait TestEventListener {
    /// Called once when the suite starts executing.
    fn run_started(&mut self, _test_count: usize) {}

    /// Called when a test case begins.
    fn test_started(&mut self, _name: &str) {}

    /// Called when a test case finishes (or is reported skipped).
    fn test_finished(&mut self, _outcome: &TestOutcome) {}

    /// Called once with the final result before `run_test` returns it.
    fn run_finished(&mut self, _result: &TestRunResult) {}
}

/// Listener for callers that only want the returned result.
#[derive(Debug, Default)]
pub struct NullListener;

impl TestEventListener for NullListener {}

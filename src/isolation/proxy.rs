//! Cross-boundary runner handle
//!
//! A [`RunnerProxy`] lives in the host's address space; its methods execute
//! inside the isolated context by serializing protocol requests over the
//! context's control channel. Configuration (test file name, optional
//! single-test selector) is staged locally and sent lazily before the first
//! `build_suite`, which must precede `run`.

use std::io::Write;

use crate::error::{IsolationError, Result};
use crate::events::TestEventListener;
use crate::isolation::context::IsolatedContext;
use crate::protocol::{Phase, Request, Response};
use crate::suite::{RunEvent, TestRunResult};

/// Remote handle to the test runner inside an isolated context.
pub struct RunnerProxy<'a> {
    context: &'a mut IsolatedContext,
    test_file_name: Option<String>,
    test_name: Option<String>,
    configured: bool,
}

impl<'a> RunnerProxy<'a> {
    pub fn new(context: &'a mut IsolatedContext) -> Self {
        Self {
            context,
            test_file_name: None,
            test_name: None,
            configured: false,
        }
    }

    /// Bare file name of the test module (no directory; the context's
    /// working directory is the module's directory).
    pub fn set_test_file_name(&mut self, name: impl Into<String>) {
        self.test_file_name = Some(name.into());
    }

    /// Restrict the run to a single named test case.
    pub fn set_test_name(&mut self, name: impl Into<String>) {
        self.test_name = Some(name.into());
    }

    fn ensure_configured(&mut self) -> Result<()> {
        if self.configured {
            return Ok(());
        }
        let test_file_name = self.test_file_name.clone().ok_or_else(|| {
            IsolationError::Protocol("test file name not set before build-suite".to_string())
        })?;

        self.context.send(&Request::Configure {
            test_file_name,
            test_name: self.test_name.clone(),
        })?;
        match self.context.receive()? {
            Response::Configured => {
                self.configured = true;
                Ok(())
            }
            Response::Failed { message, .. } => Err(IsolationError::Context(message)),
            other => Err(unexpected(&other)),
        }
    }

    /// Assemble the runnable suite inside the context. Returns the number of
    /// tests it will run.
    pub fn build_suite(&mut self) -> Result<usize> {
        self.ensure_configured()?;
        self.context.send(&Request::BuildSuite)?;
        match self.context.receive()? {
            Response::SuiteBuilt { test_count } => Ok(test_count),
            Response::Failed { phase, message } => Err(failure_for(phase, message)),
            other => Err(unexpected(&other)),
        }
    }

    /// Execute the suite, forwarding streamed events into the listener and
    /// the output sinks until the result arrives.
    pub fn run(
        &mut self,
        listener: &mut dyn TestEventListener,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<TestRunResult> {
        self.context.send(&Request::Run)?;
        loop {
            match self.context.receive()? {
                Response::Event { event } => match event {
                    RunEvent::RunStarted { test_count } => listener.run_started(test_count),
                    RunEvent::TestStarted { name } => listener.test_started(&name),
                    RunEvent::Output { text } => out.write_all(text.as_bytes())?,
                    RunEvent::ErrorOutput { text } => err.write_all(text.as_bytes())?,
                    RunEvent::TestFinished { outcome } => listener.test_finished(&outcome),
                },
                Response::RunCompleted { result } => {
                    listener.run_finished(&result);
                    return Ok(result);
                }
                Response::Failed { phase, message } => return Err(failure_for(phase, message)),
                other => return Err(unexpected(&other)),
            }
        }
    }
}

fn failure_for(phase: Phase, message: String) -> IsolationError {
    match phase {
        Phase::Configure => IsolationError::Context(message),
        Phase::BuildSuite => IsolationError::SuiteBuild(message),
        Phase::Run => IsolationError::Run(message),
    }
}

fn unexpected(response: &Response) -> IsolationError {
    IsolationError::Protocol(format!("unexpected response: {response:?}"))
}

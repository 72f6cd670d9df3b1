//! The runner's protocol server loop
//!
//! Serves the configure → build-suite → run → shutdown lifecycle over a
//! pair of channel halves (stdin/stdout in production, in-memory buffers in
//! tests). Phase errors are reported as `Failed` responses and leave the
//! loop alive; only a broken channel or an explicit shutdown ends it.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::error::{IsolationError, Result};
use crate::protocol::{self, Phase, Request, Response};
use crate::runner::config::RunnerConfig;
use crate::runner::loader::ModuleLoader;
use crate::suite::{ManifestRunner, RunEvent, SuiteRunner};

/// Startup parameters of one runner process, as received on its command
/// line.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Diagnostic context name assigned by the host.
    pub context_name: String,
    /// The context's base directory (the runner's working directory).
    pub base_dir: PathBuf,
    /// Ordered fallback probe paths.
    pub probe_paths: Vec<PathBuf>,
    /// Context-local configuration.
    pub config: RunnerConfig,
}

/// Serve the control protocol until shutdown or end of input.
pub fn serve<R: BufRead, W: Write>(
    options: &RunnerOptions,
    input: &mut R,
    output: &mut W,
) -> Result<()> {
    let loader = ModuleLoader::new(options.base_dir.clone(), options.probe_paths.clone());
    let mut configured: Option<(String, Option<String>)> = None;
    let mut runner: Option<ManifestRunner> = None;

    tracing::debug!(
        context = %options.context_name,
        base_dir = %options.base_dir.display(),
        "runner serving"
    );

    while let Some(request) = protocol::read_message::<_, Request>(input)? {
        match request {
            Request::Configure {
                test_file_name,
                test_name,
            } => {
                tracing::debug!(
                    context = %options.context_name,
                    test_file_name = %test_file_name,
                    test_name = test_name.as_deref().unwrap_or("<all>"),
                    "configured"
                );
                configured = Some((test_file_name, test_name));
                runner = None;
                protocol::write_message(output, &Response::Configured)?;
            }

            Request::BuildSuite => {
                let response =
                    match build_suite(&loader, &options.config, configured.as_ref(), &mut runner) {
                        Ok(test_count) => Response::SuiteBuilt { test_count },
                        Err(e) => Response::Failed {
                            phase: Phase::BuildSuite,
                            message: e.to_string(),
                        },
                    };
                protocol::write_message(output, &response)?;
            }

            Request::Run => {
                let response = match runner.as_mut() {
                    None => Response::Failed {
                        phase: Phase::Run,
                        message: "run requested before build-suite".to_string(),
                    },
                    Some(runner) => {
                        let mut channel_error: Option<IsolationError> = None;
                        let run_outcome = {
                            let mut emit = |event: RunEvent| {
                                if channel_error.is_some() {
                                    return;
                                }
                                if let Err(e) =
                                    protocol::write_message(output, &Response::Event { event })
                                {
                                    channel_error = Some(e);
                                }
                            };
                            runner.run(&mut emit)
                        };
                        if let Some(e) = channel_error {
                            // The host is gone; nothing left to respond to.
                            return Err(e);
                        }
                        match run_outcome {
                            Ok(result) => Response::RunCompleted { result },
                            Err(e) => Response::Failed {
                                phase: Phase::Run,
                                message: e.to_string(),
                            },
                        }
                    }
                };
                protocol::write_message(output, &response)?;
            }

            Request::Shutdown => {
                protocol::write_message(output, &Response::ShuttingDown)?;
                tracing::debug!(context = %options.context_name, "runner shutting down");
                return Ok(());
            }
        }
    }

    // Host closed the channel without a shutdown request; exit quietly.
    tracing::debug!(context = %options.context_name, "control channel closed");
    Ok(())
}

fn build_suite(
    loader: &ModuleLoader,
    config: &RunnerConfig,
    configured: Option<&(String, Option<String>)>,
    runner_slot: &mut Option<ManifestRunner>,
) -> Result<usize> {
    let (file_name, test_name) = configured.ok_or_else(|| {
        IsolationError::Protocol("build-suite requested before configure".to_string())
    })?;

    let manifest = loader.load_suite(file_name)?;
    let mut runner = ManifestRunner::new(manifest, test_name.clone())
        .fail_fast(config.fail_fast)
        .capture_output(config.capture_output);
    let test_count = runner.build_suite()?;
    *runner_slot = Some(runner);
    Ok(test_count)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::module::{self, module_extension, ModuleIdentity};
    use crate::suite::{SuiteManifest, TestBehavior, TestCaseDef};
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn unique_temp_dir() -> PathBuf {
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let pid = std::process::id();
        let dir = std::env::temp_dir().join(format!("isotest_service_test_{pid}_{id}"));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_suite_module(dir: &Path, tests: &[(&str, TestBehavior)]) -> String {
        let manifest = SuiteManifest {
            tests: tests
                .iter()
                .map(|(name, behavior)| TestCaseDef {
                    name: (*name).to_string(),
                    behavior: behavior.clone(),
                    stdout: None,
                    stderr: None,
                })
                .collect(),
            requires: Vec::new(),
        };
        let file_name = format!("tests.{}", module_extension());
        module::write(
            &dir.join(&file_name),
            &ModuleIdentity::new("tests", "1.0.0"),
            &manifest.to_payload().unwrap(),
        )
        .unwrap();
        file_name
    }

    fn drive(dir: &Path, requests: &[Request]) -> Vec<Response> {
        let mut input = Vec::new();
        for request in requests {
            protocol::write_message(&mut input, request).unwrap();
        }
        let mut reader = Cursor::new(input);
        let mut output = Vec::new();

        let options = RunnerOptions {
            context_name: "isotest-ctx-test".to_string(),
            base_dir: dir.to_path_buf(),
            probe_paths: Vec::new(),
            config: RunnerConfig::default(),
        };
        serve(&options, &mut reader, &mut output).unwrap();

        let mut responses = Vec::new();
        let mut reader = Cursor::new(output);
        while let Some(response) = protocol::read_message::<_, Response>(&mut reader).unwrap() {
            responses.push(response);
        }
        responses
    }

    #[test]
    fn test_full_lifecycle() {
        let dir = unique_temp_dir();
        let file_name = write_suite_module(
            &dir,
            &[
                ("suite.test_x", TestBehavior::Pass),
                (
                    "suite.test_y",
                    TestBehavior::Fail {
                        message: "nope".to_string(),
                    },
                ),
            ],
        );

        let responses = drive(
            &dir,
            &[
                Request::Configure {
                    test_file_name: file_name,
                    test_name: None,
                },
                Request::BuildSuite,
                Request::Run,
                Request::Shutdown,
            ],
        );

        assert!(matches!(responses[0], Response::Configured));
        assert!(matches!(responses[1], Response::SuiteBuilt { test_count: 2 }));
        match responses.last().unwrap() {
            Response::ShuttingDown => {}
            other => panic!("expected shutdown ack, got {other:?}"),
        }
        let completed = responses
            .iter()
            .find_map(|r| match r {
                Response::RunCompleted { result } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed.total, 2);
        assert_eq!(completed.passed, 1);
        assert_eq!(completed.failed, 1);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_single_test_selection() {
        let dir = unique_temp_dir();
        let file_name = write_suite_module(
            &dir,
            &[
                ("suite.test_x", TestBehavior::Pass),
                ("suite.test_y", TestBehavior::Pass),
            ],
        );

        let responses = drive(
            &dir,
            &[
                Request::Configure {
                    test_file_name: file_name,
                    test_name: Some("suite.test_x".to_string()),
                },
                Request::BuildSuite,
                Request::Run,
                Request::Shutdown,
            ],
        );

        assert!(matches!(responses[1], Response::SuiteBuilt { test_count: 1 }));
        let completed = responses
            .iter()
            .find_map(|r| match r {
                Response::RunCompleted { result } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed.total, 1);
        assert_eq!(completed.outcomes[0].name, "suite.test_x");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_build_before_configure_fails_the_phase() {
        let dir = unique_temp_dir();
        let responses = drive(&dir, &[Request::BuildSuite, Request::Shutdown]);

        assert!(matches!(
            responses[0],
            Response::Failed {
                phase: Phase::BuildSuite,
                ..
            }
        ));
        // The loop survives a phase failure.
        assert!(matches!(responses[1], Response::ShuttingDown));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_run_before_build_fails_the_phase() {
        let dir = unique_temp_dir();
        let file_name = write_suite_module(&dir, &[("suite.test_x", TestBehavior::Pass)]);

        let responses = drive(
            &dir,
            &[
                Request::Configure {
                    test_file_name: file_name,
                    test_name: None,
                },
                Request::Run,
                Request::Shutdown,
            ],
        );

        assert!(matches!(
            responses[1],
            Response::Failed {
                phase: Phase::Run,
                ..
            }
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_module_fails_suite_build() {
        let dir = unique_temp_dir();
        let responses = drive(
            &dir,
            &[
                Request::Configure {
                    test_file_name: format!("absent.{}", module_extension()),
                    test_name: None,
                },
                Request::BuildSuite,
                Request::Shutdown,
            ],
        );

        assert!(matches!(responses[0], Response::Configured));
        assert!(matches!(
            responses[1],
            Response::Failed {
                phase: Phase::BuildSuite,
                ..
            }
        ));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_eof_without_shutdown_ends_quietly() {
        let dir = unique_temp_dir();
        let responses = drive(&dir, &[]);
        assert!(responses.is_empty());
        fs::remove_dir_all(&dir).unwrap();
    }
}

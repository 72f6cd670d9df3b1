//! Isolated runner child-process entry point
//!
//! Spawned by the host coordinator with its working directory set to the
//! test module's base directory. Speaks the control protocol on
//! stdin/stdout; its own diagnostics go to stderr, which the host drains
//! into its tracing output.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use isotest::runner::{serve, RunnerConfig, RunnerOptions};

/// Child-side test runner for the isotest isolation core.
#[derive(Parser, Debug)]
#[command(name = "isotest-runner")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Diagnostic name of the isolated context
    #[arg(long = "context-name", value_name = "NAME", default_value = "isotest-ctx")]
    context_name: String,

    /// Context-local configuration file
    #[arg(long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Fallback probe directory, highest priority first (repeatable)
    #[arg(long = "probe-path", value_name = "DIR")]
    probe_paths: Vec<PathBuf>,
}

fn main() {
    // Initialize structured logging with env-based filter, defaulting to info.
    // Logs go to stderr; stdout is the control channel.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .try_init();

    let args = Args::parse();

    let base_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!(error = %e, "runner has no usable working directory");
            process::exit(1);
        }
    };

    let config = match RunnerConfig::load_optional(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(
                context = %args.context_name,
                error = %e,
                "invalid runner configuration"
            );
            process::exit(1);
        }
    };

    let options = RunnerOptions {
        context_name: args.context_name,
        base_dir,
        probe_paths: args.probe_paths,
        config,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut input = stdin.lock();
    let mut output = stdout.lock();

    if let Err(e) = serve(&options, &mut input, &mut output) {
        tracing::error!(
            context = %options.context_name,
            error = %e,
            "runner terminated abnormally"
        );
        process::exit(1);
    }
}

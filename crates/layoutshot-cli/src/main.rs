//! layoutshot: capture a full-page screenshot of a locally running web app.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use layoutshot_browser::ChromeLauncher;
use layoutshot_core::{CaptureConfig, Error, Result};
use layoutshot_runtime::{CaptureReport, Capturer};

mod args;

use args::Cli;

fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolve config in layer order: file, environment, flags.
fn resolve_config(cli: &Cli, base_dir: &Path) -> Result<CaptureConfig> {
    let mut config = CaptureConfig::discover(cli.config.as_deref(), base_dir, env_lookup)?;
    config.apply_env(env_lookup)?;
    cli.apply_to(&mut config);
    Ok(config)
}

async fn run(cli: Cli) -> Result<CaptureReport> {
    let cwd = std::env::current_dir()
        .map_err(|e| Error::Config(format!("cannot determine working directory: {}", e)))?;
    let config = resolve_config(&cli, &cwd)?;
    let request = config.to_request()?;
    let launcher = ChromeLauncher::from_settings(&config.launch_settings())?;
    info!(
        "Capturing {} at {} into {}",
        request.target_url,
        request.viewport,
        request.output_path.display()
    );
    Capturer::new(launcher).capture(&request).await
}

/// Where the result line goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// The single line a run prints, and the stream it goes to.
fn result_line(outcome: &Result<CaptureReport>) -> (Stream, String) {
    match outcome {
        Ok(report) => (
            Stream::Stdout,
            format!(
                "Screenshot saved to {} ({}x{}, {} bytes)",
                report.output_path.display(),
                report.width,
                report.height,
                report.bytes_written
            ),
        ),
        Err(e) => (Stream::Stderr, format!("Screenshot capture failed: {}", e)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    let cli = Cli::parse();
    let outcome = run(cli).await;

    match result_line(&outcome) {
        (Stream::Stdout, line) => println!("{}", line),
        (Stream::Stderr, line) => eprintln!("{}", line),
    }
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => ExitCode::from(e.exit_code()),
    }
}

mod classifier;
mod cli;
mod collector;
mod config;
mod error;
mod health;
mod llm;
mod pipeline;
mod record;
mod retry;
mod source;
mod store;
mod ui;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use classifier::AnalyzeMode;
use config::PulseConfig;
use pipeline::Pipeline;
use ui::{Printer, StageProgress};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

// Priority: RUST_LOG > --verbose > "info". Logs go to stderr so stdout only
// carries the command's result.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

/// Runs one command and reports whether its result was a success.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = PulseConfig::load(cli.config.as_deref())?;
    if config.api_key.is_empty() && matches!(cli.command, Command::Pipeline | Command::Analyze { .. }) {
        warn!("no API key configured; set OPENAI_API_KEY or api_key in pulse.toml");
    }

    let pipeline = Pipeline::from_config(&config).await?;
    let printer = Printer::new(cli.json);

    let success = match cli.command {
        Command::Pipeline => {
            let progress = StageProgress::start("Running pipeline: scrape, settle, analyze", cli.json);
            let report = pipeline.run().await;
            progress.finish();
            printer.pipeline(&report);
            report.success
        }
        Command::Scrape => {
            let progress = StageProgress::start("Scraping sources", cli.json);
            let report = pipeline.scrape().await;
            progress.finish();
            printer.scrape(&report);
            report.success
        }
        Command::Analyze { retry } => {
            let mode = if retry {
                AnalyzeMode::Retry
            } else {
                AnalyzeMode::Normal
            };
            let progress = StageProgress::start("Analyzing records", cli.json);
            let report = pipeline.analyze(mode).await;
            progress.finish();
            let report = report?;
            printer.analyze(&report);
            report.success
        }
        Command::Clear => {
            let report = pipeline.clear().await?;
            printer.clear(&report);
            report.success
        }
        Command::Health => {
            let snapshot = pipeline.health().await?;
            printer.health(&snapshot);
            true
        }
    };

    Ok(success)
}

//! graphbridge - sync content-store analysis into a knowledge graph
//!
//! Main entry point for the graphbridge CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{check, config, extract, sync};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// graphbridge - sync content-store analysis into a knowledge graph
#[derive(Parser)]
#[command(name = "graphbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of ./graphbridge.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Content store URL (default: http://localhost:8787)
    #[arg(long, global = true, env = "GRAPHBRIDGE_STORE_URL")]
    pub store_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync: fetch, extract, submit, acknowledge
    Sync(sync::SyncArgs),

    /// Print the facts a sync response file would produce
    Extract(extract::ExtractArgs),

    /// Check that the graph server starts and offers the configured tool
    Check(check::CheckArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep the guard alive so buffered file logs are flushed on exit.
    let _guard = init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("{} {:#}", console::style("error:").red().bold(), e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let ctx = commands::Context::load(
        cli.config.as_deref(),
        cli.store_url.as_deref(),
        cli.json,
        cli.verbose,
    )?;

    match cli.command {
        Commands::Sync(args) => sync::run(args, &ctx).await,
        Commands::Extract(args) => extract::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Console (human-readable, stderr) plus a daily-rotated JSON file under the
/// config directory's `logs/`.
fn init_tracing(verbose: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "graphbridge=debug,graphbridge_sync=debug,graphbridge_mcp=debug,graphbridge_store=debug,graphbridge_config=debug,warn"
    } else {
        "graphbridge=info,graphbridge_sync=info,warn"
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let log_dir = graphbridge_config::config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("graphbridge")
        .filename_suffix("log")
        .build(&log_dir)
        .ok();

    let (file_layer, guard) = match appender {
        Some(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "graphbridge=trace,graphbridge_sync=trace,graphbridge_mcp=trace,graphbridge_store=trace,graphbridge_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}

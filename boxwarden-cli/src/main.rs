//! Thin operator harness wrapping the `boxwarden` library. Not the RPC
//! service layer named out of scope in the design — a local tool for
//! exercising a sandbox end to end without one.

mod cli;
mod commands;
mod util;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

/// Logs to `{base_dir}/logs/boxwarden-cli.log` with daily rotation.
/// The returned guard must stay alive for the background writer thread
/// to keep flushing.
fn init_logging(base_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let logs_dir = base_dir.join("logs");
    let _ = std::fs::create_dir_all(&logs_dir);

    let file_appender = tracing_appender::rolling::daily(logs_dir, "boxwarden-cli.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(non_blocking)
        .init();

    guard
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli.global.base_dir());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Command::Run(args) => commands::run::execute(args, &cli.global).await,
            Command::Shell(args) => commands::shell::execute(args, &cli.global).await,
        }
    })
}

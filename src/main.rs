mod cli;
mod config;
mod coordinator;
mod filter;
mod launcher;
mod watcher;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::WatchConfig;
use coordinator::Coordinator;
use launcher::{ShellLauncher, Sink};
use watcher::start_watcher;

/// Environment variable holding the log filter (e.g. `WATCH_LOG=debug`).
const LOG_ENV: &str = "WATCH_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let no_command = cli.cmd.is_empty();
    let config = WatchConfig::from_cli(cli)?;
    if no_command {
        Cli::command().print_help()?;
        return Ok(());
    }

    let (_watcher, events) = start_watcher(&config.dir, config.recursive, config.backend)
        .with_context(|| format!("cannot watch {}", config.dir.display()))?;
    info!(
        dir = %config.dir.display(),
        recursive = config.recursive,
        command = %config.command,
        "watching"
    );

    let sink = Sink::stdout();
    let launcher = ShellLauncher::new(sink.clone()).with_shell(config.shell.clone());
    let stats = Coordinator::new(config, launcher, sink).run(events).await;

    anyhow::bail!(
        "file watcher stopped unexpectedly ({} run, {} failed, {} filtered out, {} dropped while busy)",
        stats.launched,
        stats.failed,
        stats.filtered,
        stats.dropped_busy
    )
}

/// Logs go to stderr; stdout carries the command output.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

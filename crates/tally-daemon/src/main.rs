use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tally_config::logging::init_logging;
use tally_config::{log_daemon_info, log_daemon_warn};
use tally_core::WordCounter;
use tokio::net::{UnixListener, UnixStream};
use tokio::signal;

mod server;

use server::DaemonState;

#[derive(Parser)]
#[command(name = "tallyd")]
#[command(version, about = "word-tally daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default)
    Start {
        /// Socket path (defaults to the configured socket)
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Worker threads shared by all requests
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = tally_config::config().clone();
    init_logging(config.log.log_level());

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Start {
        socket: None,
        threads: None,
    }) {
        Commands::Start { socket, threads } => {
            let socket = socket.unwrap_or_else(|| config.daemon.socket.clone());
            let mut options = config.to_scan_options();
            if threads.is_some() {
                options.threads = threads;
            }
            start_daemon(&socket, WordCounter::new(options)?).await?
        }
    }

    Ok(())
}

async fn start_daemon(socket: &Path, counter: WordCounter) -> Result<()> {
    log_daemon_info!(
        "Starting daemon",
        socket = socket.display().to_string(),
        threads = counter.threads(),
    );

    if socket.exists() {
        if UnixStream::connect(socket).await.is_ok() {
            bail!("Another daemon is already listening on {}", socket.display());
        }
        log_daemon_warn!("Removing stale socket", socket = socket.display().to_string());
        tokio::fs::remove_file(socket).await?;
    }
    if let Some(parent) = socket.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let listener = UnixListener::bind(socket)
        .with_context(|| format!("Failed to bind {}", socket.display()))?;
    log_daemon_info!("Listening", socket = socket.display().to_string());

    let state = Arc::new(DaemonState::new(counter));
    server::serve(listener, state, async {
        let _ = signal::ctrl_c().await;
    })
    .await;

    log_daemon_info!("Shutting down");
    if socket.exists() {
        tokio::fs::remove_file(socket).await?;
    }

    Ok(())
}

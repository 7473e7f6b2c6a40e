//! # tally CLI
//!
//! Command-line interface for recursive, archive-aware word counting.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tally_config::logging::init_logging;
use tally_config::Config;
use tally_ipc::client::DaemonClient;

mod count;

/// Count word frequencies under directory trees, including inside zip archives
#[derive(Parser)]
#[command(name = "tally")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count words under one or more roots and print the JSON result
    Count {
        /// Roots as KEY=PATH, or bare PATH (keyed 1, 2, ...)
        #[arg(value_name = "ROOT", required_unless_present = "request")]
        roots: Vec<String>,

        /// JSON file with a {"key": "path"} object
        #[arg(long, value_name = "FILE")]
        request: Option<PathBuf>,

        /// Worker threads
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Stop scheduling directories after this many seconds
        #[arg(long, value_name = "SECS")]
        deadline: Option<u64>,

        /// Send the request to a running tallyd instead of counting here
        #[arg(long)]
        daemon: bool,

        /// Daemon socket path
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,

        /// Print per-root traversal statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Show whether tallyd is running
    Status {
        /// Daemon socket path
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
    /// Write a default config file
    Init {
        /// Write to ~/.tally/config.toml instead of .tally/config.toml
        #[arg(long)]
        global: bool,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    init_logging(config.log.log_level());

    let cli = Cli::parse();

    match cli.command {
        Commands::Count {
            roots,
            request,
            threads,
            deadline,
            daemon,
            socket,
            pretty,
            stats,
        } => {
            let request = count::build_request(&roots, request.as_deref())?;
            let result = if daemon {
                let socket = socket.unwrap_or_else(|| config.daemon.socket.clone());
                runtime()?.block_on(count::count_via_daemon(request, &socket))?
            } else {
                let mut options = config.to_scan_options();
                if threads.is_some() {
                    options.threads = threads;
                }
                if let Some(secs) = deadline {
                    options.deadline = Some(std::time::Duration::from_secs(secs));
                }
                count::count_local(&request, options, stats)?
            };
            count::print_result(&result, pretty)?;
        }
        Commands::Status { socket } => {
            let socket = socket.unwrap_or_else(|| config.daemon.socket.clone());
            runtime()?.block_on(async {
                let mut client = DaemonClient::connect_to(&socket)
                    .await
                    .with_context(|| format!("tallyd is not running at {}", socket.display()))?;
                let version = client.handshake().await?;
                let status = client.status().await?;
                println!("tallyd {} at {}: {}", version, socket.display(), status);
                Ok::<_, anyhow::Error>(())
            })?;
        }
        Commands::Config { command } => cmd_config(command, &config)?,
    }

    Ok(())
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn cmd_config(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: {}", Config::project_config_path().display());
        }
        ConfigCommands::Init { global, force } => {
            let path = if global {
                Config::global_config_path().context("No home directory for the global config")?
            } else {
                Config::project_config_path()
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, Config::default_toml())?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

//! scrape-to-md command line
//!
//! Scrapes one URL into a Markdown file, creates the config file, or runs
//! and manages the background browser daemon.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use scrape_to_md::config::{Config, DEFAULT_CONFIG_TEMPLATE};
use scrape_to_md::daemon::{daemon_status, run_daemon, stop_daemon, StopOutcome};
use scrape_to_md::dispatch::Dispatcher;
use scrape_to_md::logging;
use scrape_to_md::sources::Progress;

const AFTER_HELP: &str = "\
Examples:
  scrape-to-md https://example.com/article
  scrape-to-md https://youtube.com/watch?v=abc123
  scrape-to-md https://example.com/document.pdf
  scrape-to-md https://example.com/page -o ~/my-docs

Web scraping starts the daemon in the background when it is not running.
Use 'serve' to run it in the foreground for debugging.

Config file: ~/.config/scrape_to_md/config.yml";

/// Scrape URLs to Markdown files
#[derive(Parser, Debug)]
#[command(name = "scrape-to-md")]
#[command(version)]
#[command(about = "Scrape web pages, videos and PDFs to Markdown files")]
#[command(after_help = AFTER_HELP)]
#[command(args_conflicts_with_subcommands = true)]
#[command(arg_required_else_help = true)]
struct Args {
    /// URL to scrape
    url: Option<String>,

    /// Output directory (default: ~/Documents/scraped or from config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the default config file
    Init {
        /// Overwrite an existing file without asking
        #[arg(long)]
        force: bool,
    },
    /// Run the browser daemon in the foreground, or manage a running one
    Serve {
        /// Stop the running daemon
        #[arg(long, conflicts_with = "status")]
        stop: bool,

        /// Report whether the daemon is running
        #[arg(long)]
        status: bool,
    },
}

fn load_config() -> Result<Config> {
    let loaded = Config::load()?;
    if let Some(warning) = loaded.warning {
        tracing::warn!("{}", warning);
        eprintln!("Warning: {warning}");
    }
    Ok(loaded.config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    if let Some(Command::Serve {
        stop: false,
        status: false,
    }) = args.command
    {
        return handle_serve(args.verbose).await;
    }

    logging::init_cli(args.verbose);
    match args.command {
        Some(Command::Init { force }) => handle_init(force),
        Some(Command::Serve { stop: true, .. }) => handle_serve_stop(),
        Some(Command::Serve { .. }) => handle_serve_status().await,
        None => match args.url {
            Some(url) => handle_scrape(&url, args.output).await,
            None => Ok(ExitCode::FAILURE),
        },
    }
}

async fn handle_scrape(url: &str, output: Option<PathBuf>) -> Result<ExitCode> {
    let config = load_config()?;
    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    let dispatcher = Dispatcher::from_config(&config, Progress::stderr());

    tokio::select! {
        saved = dispatcher.scrape_to_file(url, &output_dir) => {
            let path = saved?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted");
            Ok(ExitCode::from(130))
        }
    }
}

async fn handle_serve(verbose: bool) -> Result<ExitCode> {
    let config = load_config()?;
    let _guard = logging::init_daemon(&config.logs_dir, verbose)?;

    tracing::info!(
        socket = %config.socket_path.display(),
        port = config.cdp_port,
        "Starting scrape daemon"
    );

    if let Err(e) = run_daemon(config).await {
        tracing::error!("Daemon exited with error: {}", e);
        return Err(e.into());
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_serve_stop() -> Result<ExitCode> {
    let config = load_config()?;
    match stop_daemon(&config)? {
        StopOutcome::NotRunning => println!("Daemon is not running"),
        StopOutcome::Stopped(pid) => println!("Stopped daemon (PID {pid})"),
        StopOutcome::StaleRemoved => {
            println!("Daemon process not found, cleaning up stale PID file")
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn handle_serve_status() -> Result<ExitCode> {
    let config = load_config()?;
    let status = daemon_status(&config).await;

    if status.running {
        match status.pid {
            Some(pid) => println!("Daemon is running (PID {pid})"),
            None => println!("Daemon is running"),
        }
        if let Some(details) = status.details {
            println!("  Browser session: {}", details.session_state);
            println!("  Uptime: {}s", details.uptime_seconds);
            println!(
                "  Scrapes: {} ({} failed)",
                details.scrapes_total, details.scrape_failures
            );
        }
    } else {
        println!("Daemon is not running");
        if status.stale_pid_file {
            println!("Warning: Stale PID file found");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_init(force: bool) -> Result<ExitCode> {
    let path = Config::file_path()?;

    if path.exists() && !force {
        println!("Config file already exists at {}", path.display());
        print!("Overwrite? (y/N): ");
        std::io::stdout().flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            println!("Init cancelled");
            return Ok(ExitCode::SUCCESS);
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow!("Failed to create {}: {e}", parent.display()))?;
    }
    std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
        .map_err(|e| anyhow!("Failed to write {}: {e}", path.display()))?;

    println!("Created config file at {}", path.display());
    println!("\nYou can now edit this file to customize your settings.");
    Ok(ExitCode::SUCCESS)
}

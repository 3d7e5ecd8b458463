//! Background scrape daemon
//!
//! The daemon keeps one browser session warm and serves scrapes over a Unix
//! socket. This module holds the process-level helpers shared by the daemon
//! itself and by the CLI that starts, probes and stops it.

pub mod client;
pub mod handlers;
pub mod server;

pub use client::DaemonClient;
pub use handlers::{router, ServerContext, StatusResponse};
pub use server::run_daemon;

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, info};

use crate::browser::process::{is_process_alive, read_pid, remove_stale_pid_file, send_terminate};
use crate::config::Config;
use crate::error::{DaemonError, Result};

/// Timeout of a single socket liveness probe
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);

/// Liveness polls after spawning the daemon
pub const STARTUP_POLLS: u32 = 50;

/// Interval between liveness polls
pub const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Whether a daemon is accepting connections on `socket_path`.
pub async fn is_daemon_running(socket_path: &Path) -> bool {
    if !socket_path.exists() {
        return false;
    }
    matches!(
        tokio::time::timeout(LIVENESS_TIMEOUT, UnixStream::connect(socket_path)).await,
        Ok(Ok(_))
    )
}

/// Poll the socket until the daemon answers or the attempts run out.
pub async fn wait_for_daemon(socket_path: &Path, polls: u32, interval: Duration) -> bool {
    for _ in 0..polls {
        tokio::time::sleep(interval).await;
        if is_daemon_running(socket_path).await {
            return true;
        }
    }
    false
}

/// Starts a daemon process in the background
pub trait DaemonSpawner: Send + Sync {
    /// Spawn the daemon without waiting for it
    fn spawn(&self) -> Result<()>;
}

/// Re-executes the current binary as `serve`, detached from the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct BackgroundSpawner;

impl DaemonSpawner for BackgroundSpawner {
    fn spawn(&self) -> Result<()> {
        let exe = std::env::current_exe()?;
        let child = Command::new(&exe)
            .arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;
        debug!(pid = child.id(), exe = %exe.display(), "Spawned daemon");
        Ok(())
    }
}

/// Clean up after a daemon that died without its shutdown path.
///
/// Fails when a daemon is already serving on the socket. Otherwise PID
/// files naming dead processes are removed; the socket file itself is
/// replaced when the new daemon binds.
pub async fn reconcile_stale_files(config: &Config) -> Result<()> {
    if is_daemon_running(&config.socket_path).await {
        return Err(DaemonError::AlreadyRunning(config.socket_path.display().to_string()).into());
    }

    for pid_file in [config.daemon_pid_file(), config.chrome_pid_file()] {
        if remove_stale_pid_file(&pid_file) {
            info!(path = %pid_file.display(), "Reconciled stale PID file");
        }
    }
    Ok(())
}

/// Outcome of `serve --stop`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No PID file
    NotRunning,
    /// SIGTERM sent to this PID
    Stopped(i32),
    /// The recorded process was gone; its PID file was removed
    StaleRemoved,
}

/// Ask the daemon recorded in the PID file to shut down.
pub fn stop_daemon(config: &Config) -> Result<StopOutcome> {
    let pid_file = config.daemon_pid_file();
    if !pid_file.exists() {
        return Ok(StopOutcome::NotRunning);
    }

    let pid = match read_pid(&pid_file) {
        Some(pid) if is_process_alive(pid) => pid,
        _ => {
            std::fs::remove_file(&pid_file)?;
            return Ok(StopOutcome::StaleRemoved);
        }
    };

    match send_terminate(pid) {
        Ok(()) => Ok(StopOutcome::Stopped(pid)),
        Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
            std::fs::remove_file(&pid_file)?;
            Ok(StopOutcome::StaleRemoved)
        }
        Err(e) => Err(e.into()),
    }
}

/// What `serve --status` reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    /// Socket accepting connections
    pub running: bool,
    /// PID from the PID file, if any
    pub pid: Option<i32>,
    /// A PID file exists although the daemon is not running
    pub stale_pid_file: bool,
    /// Details reported by the daemon itself
    pub details: Option<StatusResponse>,
}

/// Gather daemon status from the socket and the PID file.
pub async fn daemon_status(config: &Config) -> DaemonStatus {
    let pid_file = config.daemon_pid_file();
    let running = is_daemon_running(&config.socket_path).await;
    let pid = read_pid(&pid_file);

    let details = if running {
        DaemonClient::new(&config.socket_path)
            .with_timeout(Duration::from_secs(2))
            .status()
            .await
            .ok()
    } else {
        None
    };

    DaemonStatus {
        running,
        pid,
        stale_pid_file: !running && pid_file.exists(),
        details,
    }
}

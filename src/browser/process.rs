//! Browser process supervision
//!
//! Launching Chrome with a remote debugging port, probing the port, and
//! the PID file bookkeeping shared by the daemon and the browser it owns.

use crate::error::{BrowserError, Result};
use std::io::ErrorKind;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Timeout of a single reachability probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Probe the debugging endpoint with a short TCP connect.
pub async fn is_endpoint_reachable(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

/// Arguments for a debuggable Chrome bound to a persisted profile
pub fn chrome_args(port: u16, profile: &Path) -> Vec<String> {
    vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={}", profile.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
    ]
}

/// Start Chrome detached from this process group and return its PID.
///
/// The browser outlives the caller's terminal session; it is only stopped
/// through its PID file. Its exit status is collected in the background so
/// a terminated browser does not linger as a zombie.
pub fn launch_chrome(executable: &Path, port: u16, profile: &Path) -> Result<u32> {
    std::fs::create_dir_all(profile)?;

    let child = Command::new(executable)
        .args(chrome_args(port, profile))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .map_err(|e| BrowserError::LaunchFailed(format!("{}: {}", executable.display(), e)))?;

    let pid = child.id();
    info!(pid, port, executable = %executable.display(), "Launched Chrome");
    reap_in_background(child);
    Ok(pid)
}

/// Wait for `child` on a detached thread.
fn reap_in_background(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name(format!("reap-{pid}"))
        .spawn(move || match child.wait() {
            Ok(status) => debug!(pid, %status, "Chrome exited"),
            Err(e) => warn!(pid, error = %e, "Failed to wait for Chrome"),
        });
    if let Err(e) = spawned {
        warn!(pid, error = %e, "Failed to start reaper thread");
    }
}

/// Check whether a process with this PID exists.
pub fn is_process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // Signal 0 performs the permission and existence checks only
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().kind() == ErrorKind::PermissionDenied
}

/// Send SIGTERM to a process.
pub fn send_terminate(pid: i32) -> std::io::Result<()> {
    if pid <= 0 {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid pid {pid}"),
        ));
    }
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// Read a PID file. Missing or garbled files read as `None`.
pub fn read_pid(path: &Path) -> Option<i32> {
    let text = std::fs::read_to_string(path).ok()?;
    text.trim().parse().ok()
}

/// Write a PID file, creating its directory.
pub fn write_pid(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, pid.to_string())?;
    debug!(pid, path = %path.display(), "Wrote PID file");
    Ok(())
}

/// Terminate the process named by a PID file and remove the file.
///
/// Never fails: every problem is logged and shutdown carries on.
pub fn terminate_from_pid_file(path: &Path) {
    if !path.exists() {
        return;
    }

    match read_pid(path) {
        Some(pid) => match send_terminate(pid) {
            Ok(()) => info!(pid, "Sent SIGTERM"),
            Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {
                debug!(pid, "Process already gone")
            }
            Err(e) => warn!(pid, error = %e, "Failed to terminate process"),
        },
        None => warn!(path = %path.display(), "Unreadable PID file"),
    }

    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove PID file");
        }
    }
}

/// Remove a PID file whose process no longer exists. Returns whether the
/// file was removed.
pub fn remove_stale_pid_file(path: &Path) -> bool {
    if !path.exists() {
        return false;
    }
    let alive = read_pid(path).map(is_process_alive).unwrap_or(false);
    if alive {
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Removed stale PID file");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove stale PID file");
            false
        }
    }
}

/// PID file owned for the lifetime of this value
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Record the current process
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        write_pid(&path, std::process::id())?;
        Ok(Self { path })
    }

    /// Location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // Only remove the file if it still names us
        if read_pid(&self.path) == Some(std::process::id() as i32) {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_chrome_args() {
        let args = chrome_args(9333, Path::new("/tmp/profile"));
        assert_eq!(
            args,
            vec![
                "--remote-debugging-port=9333",
                "--user-data-dir=/tmp/profile",
                "--no-first-run",
                "--no-default-browser-check",
            ]
        );
    }

    #[test]
    fn test_pid_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pids").join("x.pid");
        write_pid(&path, 4242).unwrap();
        assert_eq!(read_pid(&path), Some(4242));

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_pid(&path), None);
        assert_eq!(read_pid(&dir.path().join("missing.pid")), None);
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id() as i32));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(-5));
    }

    #[test]
    fn test_stale_pid_file_removed() {
        let dir = tempdir().unwrap();
        let stale = dir.path().join("stale.pid");
        // PIDs near i32::MAX are never handed out
        std::fs::write(&stale, (i32::MAX - 1).to_string()).unwrap();
        assert!(remove_stale_pid_file(&stale));
        assert!(!stale.exists());

        let live = dir.path().join("live.pid");
        write_pid(&live, std::process::id()).unwrap();
        assert!(!remove_stale_pid_file(&live));
        assert!(live.exists());
    }

    #[test]
    fn test_terminate_tolerates_dead_process() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dead.pid");
        std::fs::write(&path, (i32::MAX - 1).to_string()).unwrap();
        terminate_from_pid_file(&path);
        assert!(!path.exists());

        // Missing file is a no-op
        terminate_from_pid_file(&path);
    }

    #[test]
    fn test_pid_file_guard() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        {
            let guard = PidFile::create(&path).unwrap();
            assert_eq!(guard.path(), path.as_path());
            assert_eq!(read_pid(&path), Some(std::process::id() as i32));
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_exited_browser_is_reaped() {
        let dir = tempdir().unwrap();
        // `true` ignores the Chrome flags and exits immediately
        let pid = launch_chrome(Path::new("true"), 9, &dir.path().join("profile")).unwrap() as i32;

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while is_process_alive(pid) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!is_process_alive(pid));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_endpoint_reachable(port, PROBE_TIMEOUT).await);
        drop(listener);
        assert!(!is_endpoint_reachable(port, PROBE_TIMEOUT).await);
    }
}

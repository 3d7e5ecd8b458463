//! Daemon process: Unix socket server around the persistent browser session

use std::future::Future;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use tokio::net::UnixListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use super::handlers::{router, ServerContext};
use super::reconcile_stale_files;
use crate::browser::process::PidFile;
use crate::browser::{ChromeLauncher, ChromeSession, NavigationOptions, PageScraper};
use crate::config::Config;
use crate::error::Result;

/// Remove a leftover socket file and bind a fresh listener, owner-only.
pub fn bind_socket(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    match std::fs::remove_file(socket_path) {
        Ok(()) => info!(socket = %socket_path.display(), "Removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let listener = UnixListener::bind(socket_path)?;
    std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    info!(socket = %socket_path.display(), "daemon listening");
    Ok(listener)
}

/// Serve the daemon routes on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: UnixListener, ctx: Arc<ServerContext>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Resolves once `stop` flips to true; never if the sender goes away.
async fn stop_requested(mut stop: watch::Receiver<bool>) {
    if stop.wait_for(|stopped| *stopped).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves on SIGTERM, SIGINT, or when `stop` flips to true.
async fn shutdown_signal(stop: watch::Receiver<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers, using ctrl-c only");
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = stop_requested(stop) => {}
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
        _ = stop_requested(stop) => info!("Shutdown requested"),
    }
}

/// Run the daemon in the foreground until a termination signal arrives.
///
/// Reconciles leftovers from a previous run, records the daemon PID, binds
/// the socket, connects the browser session and serves requests. On the way
/// out the session is stopped, which also terminates the browser it
/// launched, and the socket and PID files are removed.
pub async fn run_daemon(config: Config) -> Result<()> {
    reconcile_stale_files(&config).await?;

    let pid_file = PidFile::create(config.daemon_pid_file())?;
    info!(pid = std::process::id(), "Daemon PID");

    let listener = bind_socket(&config.socket_path)?;

    let navigation =
        NavigationOptions::dom_ready(config.navigation_timeout_ms, config.settle_delay_ms);
    let session = Arc::new(ChromeSession::new(
        ChromeLauncher::new(config.clone()),
        navigation,
    ));
    let ctx = Arc::new(ServerContext::new(
        Arc::clone(&session) as Arc<dyn PageScraper>
    ));

    // The socket is live before the browser is; early requests wait on the
    // session's transition lock.
    let (stop_tx, stop_rx) = watch::channel(false);
    let startup = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            let started = session.start().await;
            match started {
                Ok(()) => info!("Chrome scraper service started"),
                Err(ref e) => {
                    error!("Failed to start browser session: {}", e);
                    let _ = stop_tx.send(true);
                }
            }
            started
        })
    };

    let served = serve(listener, ctx, shutdown_signal(stop_rx)).await;

    let startup_result = if startup.is_finished() {
        startup.await.ok()
    } else {
        startup.abort();
        None
    };

    session.stop().await;
    info!("Chrome scraper service stopped");

    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "Failed to remove socket");
        }
    }
    drop(pid_file);

    served?;
    match startup_result {
        Some(Err(e)) => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_socket_replaces_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("run").join("d.sock");
        std::fs::create_dir_all(socket.parent().unwrap()).unwrap();
        std::fs::write(&socket, b"stale").unwrap();

        let _listener = bind_socket(&socket).unwrap();
        let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(tokio::net::UnixStream::connect(&socket).await.is_ok());
    }
}

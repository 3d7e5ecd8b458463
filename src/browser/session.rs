//! Persistent browser session
//!
//! [`SessionManager`] owns the connection to a long-lived, logged-in Chrome
//! and heals it transparently: every scrape first probes the connection and
//! performs a full stop/start cycle when it is gone or has no window left.
//!
//! Connect, reconnect and stop transitions are serialized by an async mutex.
//! Scrapes on a healthy session only clone the current connection handle,
//! so they run concurrently.

use super::navigation::NavigationOptions;
use crate::error::{BrowserError, Result};
use crate::extraction::ContentExtractor;
use crate::types::ScrapeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of a [`SessionManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing attempted yet
    Uninitialized,
    /// Launching or connecting
    Starting,
    /// Connection established
    Connected,
    /// Tearing down a dead connection before starting again
    Reconnecting,
    /// Stopped, or the last start failed
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Starting => "starting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Result of probing a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Connected with at least one browsing context
    Ready,
    /// Connected, but no window to open pages in
    NoContexts,
    /// The connection is gone
    Closed,
}

/// Raw page data read from the browser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Document title
    pub title: String,
    /// Full page markup
    pub html: String,
    /// Inner markup of the requested element, when a selector matched
    pub selected_html: Option<String>,
}

impl PageSnapshot {
    /// Markup handed to extraction: the selected element wrapped as a
    /// document, or the full page.
    pub fn extraction_html(&self) -> String {
        match self.selected_html {
            Some(ref inner) => ContentExtractor::wrap_fragment(inner),
            None => self.html.clone(),
        }
    }
}

/// A live protocol connection to a browser
#[async_trait]
pub trait BrowserConnection: Send + Sync + 'static {
    /// Probe whether the connection can still serve scrapes
    async fn health(&self) -> ConnectionHealth;

    /// Open a page in the first browsing context, navigate, read it and
    /// close the page again on every path.
    async fn snapshot(
        &self,
        url: &str,
        selector: Option<&str>,
        nav: &NavigationOptions,
    ) -> Result<PageSnapshot>;

    /// Drop the connection without closing the browser itself
    async fn disconnect(&self) -> Result<()>;
}

/// Starts the browser process and opens connections to it
#[async_trait]
pub trait BrowserLauncher: Send + Sync + 'static {
    /// Connection type produced by [`BrowserLauncher::connect`]
    type Connection: BrowserConnection;

    /// Human-readable debugging endpoint
    fn endpoint(&self) -> String;

    /// Short health check of the debugging endpoint
    async fn is_reachable(&self) -> bool;

    /// Launch the browser process and record its PID
    async fn launch(&self) -> Result<()>;

    /// Open a protocol connection
    async fn connect(&self) -> Result<Self::Connection>;

    /// Terminate the browser recorded in the PID file, if any. Never fails.
    fn terminate(&self);
}

/// Bounds for starting and connecting
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Connection attempts before giving up (default: 3)
    pub connect_attempts: u32,
    /// Pause between connection attempts (default: 2s)
    pub retry_pause: Duration,
    /// Reachability polls after a launch (default: 30)
    pub startup_polls: u32,
    /// Interval between reachability polls (default: 1s)
    pub poll_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_attempts: 3,
            retry_pause: Duration::from_secs(2),
            startup_polls: 30,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Owner of the single browser session of this process
pub struct SessionManager<L: BrowserLauncher> {
    launcher: L,
    policy: RetryPolicy,
    navigation: NavigationOptions,
    connection: RwLock<Option<Arc<L::Connection>>>,
    transition: Mutex<()>,
    state: parking_lot::RwLock<SessionState>,
}

impl<L: BrowserLauncher> SessionManager<L> {
    /// Create an idle manager
    pub fn new(launcher: L, navigation: NavigationOptions) -> Self {
        Self {
            launcher,
            policy: RetryPolicy::default(),
            navigation,
            connection: RwLock::new(None),
            transition: Mutex::new(()),
            state: parking_lot::RwLock::new(SessionState::Uninitialized),
        }
    }

    /// Override start and connect bounds
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// The launcher this manager drives
    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn set_state(&self, state: SessionState) {
        let previous = std::mem::replace(&mut *self.state.write(), state);
        if previous != state {
            debug!(from = %previous, to = %state, "Session state changed");
        }
    }

    async fn current(&self) -> Option<Arc<L::Connection>> {
        self.connection.read().await.clone()
    }

    /// Make sure the browser is running and connect to it.
    #[instrument(skip(self), fields(endpoint = %self.launcher.endpoint()))]
    pub async fn start(&self) -> Result<()> {
        let _transition = self.transition.lock().await;
        self.start_locked().await
    }

    async fn start_locked(&self) -> Result<()> {
        self.set_state(SessionState::Starting);
        match self.connect_with_retry().await {
            Ok(conn) => {
                *self.connection.write().await = Some(Arc::new(conn));
                self.set_state(SessionState::Connected);
                info!(endpoint = %self.launcher.endpoint(), "Connected to browser");
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Stopped);
                Err(e)
            }
        }
    }

    /// Launch the browser when its endpoint is unreachable, then wait for
    /// it to come up.
    async fn ensure_browser_running(&self) -> Result<()> {
        if self.launcher.is_reachable().await {
            return Ok(());
        }

        info!("Chrome not running, launching...");
        self.launcher.launch().await?;

        for _ in 0..self.policy.startup_polls {
            tokio::time::sleep(self.policy.poll_interval).await;
            if self.launcher.is_reachable().await {
                info!("Chrome is ready");
                return Ok(());
            }
        }

        let waited = self.policy.poll_interval * self.policy.startup_polls;
        Err(BrowserError::StartupTimeout(waited.as_secs()).into())
    }

    async fn connect_with_retry(&self) -> Result<L::Connection> {
        self.ensure_browser_running().await?;

        let attempts = self.policy.connect_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.launcher.connect().await {
                Ok(conn) => return Ok(conn),
                Err(e) => e,
            };

            if !err.is_connection_refused() {
                return Err(err);
            }

            warn!(attempt, attempts, error = %err, "Failed to connect to Chrome");
            if attempt >= attempts {
                return Err(BrowserError::RetriesExhausted {
                    attempts,
                    message: err.to_string(),
                }
                .into());
            }

            info!("Chrome connection refused, restarting Chrome...");
            self.launcher.terminate();
            self.ensure_browser_running().await?;
            tokio::time::sleep(self.policy.retry_pause).await;
        }
    }

    /// Return a healthy connection, reconnecting when there is none, it is
    /// closed, or it has no browsing context.
    pub async fn ensure_connected(&self) -> Result<Arc<L::Connection>> {
        if let Some(conn) = self.current().await {
            if conn.health().await == ConnectionHealth::Ready {
                return Ok(conn);
            }
        }

        let _transition = self.transition.lock().await;

        // Another task may have reconnected while this one waited
        if let Some(conn) = self.current().await {
            let health = conn.health().await;
            if health == ConnectionHealth::Ready {
                return Ok(conn);
            }
            info!(?health, "Browser disconnected or no contexts, reconnecting...");
        } else {
            info!("No browser connection, connecting...");
        }

        self.set_state(SessionState::Reconnecting);
        self.stop_locked().await;
        self.start_locked().await?;

        let conn = self.current().await.ok_or(BrowserError::ConnectionLost)?;
        match conn.health().await {
            ConnectionHealth::Ready => Ok(conn),
            ConnectionHealth::NoContexts => Err(BrowserError::NoBrowserWindows.into()),
            ConnectionHealth::Closed => Err(BrowserError::ConnectionLost.into()),
        }
    }

    /// Scrape `url` in the logged-in browser.
    ///
    /// Never fails: every problem ends up in [`ScrapeResult::error`].
    #[instrument(skip(self), fields(url = %url))]
    pub async fn scrape(&self, url: &str, selector: Option<&str>) -> ScrapeResult {
        match self.try_scrape(url, selector).await {
            Ok(result) => result,
            Err(e) => {
                error!("Scraping error for {}: {}", url, e);
                ScrapeResult::failure(url, e.to_string())
            }
        }
    }

    async fn try_scrape(&self, url: &str, selector: Option<&str>) -> Result<ScrapeResult> {
        let conn = self.ensure_connected().await?;
        let snapshot = conn.snapshot(url, selector, &self.navigation).await?;

        let markdown = ContentExtractor::extract(&snapshot.extraction_html()).unwrap_or_default();
        debug!(
            title = %snapshot.title,
            markdown_len = markdown.len(),
            "Scrape complete"
        );
        Ok(ScrapeResult::success(url, snapshot.title, markdown))
    }

    /// Disconnect and terminate the browser this manager launched.
    pub async fn stop(&self) {
        let _transition = self.transition.lock().await;
        self.stop_locked().await;
        self.set_state(SessionState::Stopped);
    }

    async fn stop_locked(&self) {
        let previous = self.connection.write().await.take();
        if let Some(conn) = previous {
            if let Err(e) = conn.disconnect().await {
                warn!("Error closing browser connection: {}", e);
            }
        }
        self.launcher.terminate();
    }
}

impl<L: BrowserLauncher> fmt::Debug for SessionManager<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoint", &self.launcher.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

/// Anything that can turn a URL into a [`ScrapeResult`]
#[async_trait]
pub trait PageScraper: Send + Sync + 'static {
    /// Scrape one page; failures are reported inside the result
    async fn scrape(&self, url: &str, selector: Option<&str>) -> ScrapeResult;

    /// Current session state
    fn state(&self) -> SessionState;
}

#[async_trait]
impl<L: BrowserLauncher> PageScraper for SessionManager<L> {
    async fn scrape(&self, url: &str, selector: Option<&str>) -> ScrapeResult {
        SessionManager::scrape(self, url, selector).await
    }

    fn state(&self) -> SessionState {
        SessionManager::state(self)
    }
}

//! Chrome DevTools Protocol backend for the session manager
//!
//! [`ChromeLauncher`] starts a user-visible Chrome on the persisted profile
//! and attaches to it over its debugging port. [`CdpConnection`] drives the
//! attached browser through chromiumoxide.

use super::navigation::{NavigationOptions, PageNavigator};
use super::process::{self, PROBE_TIMEOUT};
use super::session::{BrowserConnection, BrowserLauncher, ConnectionHealth, PageSnapshot};
use crate::config::Config;
use crate::error::{BrowserError, Error, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::target::GetTargetsParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Upper bound for a single health probe
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for resolving the websocket endpoint
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches and attaches to the persistent Chrome
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    config: Config,
    http: reqwest::Client,
}

impl ChromeLauncher {
    /// Create a launcher for the configured port and profile
    pub fn new(config: Config) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn version_url(&self) -> String {
        format!("http://127.0.0.1:{}/json/version", self.config.cdp_port)
    }

    /// Resolve the browser websocket URL from `/json/version`
    async fn websocket_url(&self) -> Result<String> {
        let response = self
            .http
            .get(self.version_url())
            .timeout(VERSION_TIMEOUT)
            .send()
            .await
            .map_err(|e| self.classify_http_error(e))?;

        let json: serde_json::Value = response.json().await?;
        json.get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::cdp("No webSocketDebuggerUrl in response"))
    }

    fn classify_http_error(&self, e: reqwest::Error) -> Error {
        if e.is_connect() {
            BrowserError::ConnectionRefused {
                endpoint: self.endpoint(),
                message: e.to_string(),
            }
            .into()
        } else {
            e.into()
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    type Connection = CdpConnection;

    fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.config.cdp_port)
    }

    async fn is_reachable(&self) -> bool {
        process::is_endpoint_reachable(self.config.cdp_port, PROBE_TIMEOUT).await
    }

    async fn launch(&self) -> Result<()> {
        let executable = self.config.find_chrome_executable()?;
        info!(profile = %self.config.chrome_profile.display(), "Launching Chrome with profile");

        let pid = process::launch_chrome(
            &executable,
            self.config.cdp_port,
            &self.config.chrome_profile,
        )?;
        process::write_pid(&self.config.chrome_pid_file(), pid)?;
        info!(pid, "Chrome browser PID");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn connect(&self) -> Result<CdpConnection> {
        let ws_url = self.websocket_url().await?;
        debug!(ws_url = %ws_url, "Connecting to WebSocket");

        let (browser, mut handler) = Browser::connect(ws_url).await.map_err(|e| {
            BrowserError::ConnectionRefused {
                endpoint: self.endpoint(),
                message: e.to_string(),
            }
        })?;

        // Attached browsers emit events chromiumoxide cannot decode; only
        // the end of the stream means the connection is gone.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
            debug!("Browser handler finished");
        });

        Ok(CdpConnection {
            browser,
            handler: handler_task,
        })
    }

    fn terminate(&self) {
        process::terminate_from_pid_file(&self.config.chrome_pid_file());
    }
}

/// Live chromiumoxide connection to an attached browser
pub struct CdpConnection {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl CdpConnection {
    async fn page_target_count(&self) -> Result<usize> {
        let response = self
            .browser
            .execute(GetTargetsParams::default())
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        Ok(response
            .result
            .target_infos
            .iter()
            .filter(|target| target.r#type == "page")
            .count())
    }

    async fn capture(
        page: &Page,
        url: &str,
        selector: Option<&str>,
        nav: &NavigationOptions,
    ) -> Result<PageSnapshot> {
        PageNavigator::goto(page, url, nav).await?;

        let title = page
            .get_title()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?
            .unwrap_or_default();

        let selected_html = match selector {
            Some(selector) => match page.find_element(selector).await {
                Ok(element) => element.inner_html().await.ok().flatten(),
                Err(e) => {
                    debug!(selector, error = %e, "Selector matched nothing, using full page");
                    None
                }
            },
            None => None,
        };

        let html = if selected_html.is_some() {
            String::new()
        } else {
            page.content().await.map_err(|e| Error::cdp(e.to_string()))?
        };

        Ok(PageSnapshot {
            title,
            html,
            selected_html,
        })
    }
}

#[async_trait]
impl BrowserConnection for CdpConnection {
    async fn health(&self) -> ConnectionHealth {
        if self.handler.is_finished() {
            return ConnectionHealth::Closed;
        }

        match tokio::time::timeout(HEALTH_TIMEOUT, self.page_target_count()).await {
            Ok(Ok(0)) => ConnectionHealth::NoContexts,
            Ok(Ok(_)) => ConnectionHealth::Ready,
            Ok(Err(e)) => {
                warn!("Error checking browser connection: {}", e);
                ConnectionHealth::Closed
            }
            Err(_) => {
                warn!("Browser health probe timed out");
                ConnectionHealth::Closed
            }
        }
    }

    async fn snapshot(
        &self,
        url: &str,
        selector: Option<&str>,
        nav: &NavigationOptions,
    ) -> Result<PageSnapshot> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        let outcome = Self::capture(&page, url, selector, nav).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
        outcome
    }

    async fn disconnect(&self) -> Result<()> {
        // Browser.close would quit the user's Chrome; dropping the
        // websocket only detaches.
        self.handler.abort();
        Ok(())
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

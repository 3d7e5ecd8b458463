//! Ephemeral browser for one-off scrapes
//!
//! Launches a headless Chromium on a throwaway profile, reads one page and
//! tears everything down again, independent of the daemon's logged-in
//! session.

use super::navigation::{NavigationOptions, PageNavigator};
use super::session::PageSnapshot;
use crate::error::{BrowserError, Error, Result};
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Window size of the standalone browser
const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Navigation timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            chrome_path: None,
        }
    }
}

impl BrowserConfig {
    /// Create a new config builder
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }
}

/// Builder for BrowserConfig
#[derive(Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    /// Set navigation timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Build the config
    pub fn build(self) -> BrowserConfig {
        self.config
    }
}

/// Temporary profile directory, removed on drop
#[derive(Debug)]
struct ProfileDir {
    path: PathBuf,
}

impl ProfileDir {
    fn create() -> Result<Self> {
        let path = std::env::temp_dir().join(format!("scrape-to-md-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Failed to remove temporary profile");
        }
    }
}

/// Headless browser that lives for a single scrape
pub struct BrowserController {
    browser: Browser,
    handler: JoinHandle<()>,
    config: BrowserConfig,
    // Declared last so the profile is removed after the browser is gone
    _profile: ProfileDir,
}

impl BrowserController {
    /// Launch a browser on a fresh temporary profile
    #[instrument(skip(config))]
    pub async fn launch(config: BrowserConfig) -> Result<Self> {
        info!(timeout_ms = config.timeout_ms, "Launching headless browser");

        let profile = ProfileDir::create()?;

        let mut builder = CdpBrowserConfig::builder()
            .user_data_dir(profile.path())
            .request_timeout(Duration::from_millis(config.timeout_ms))
            .viewport(chromiumoxide::handler::viewport::Viewport {
                width: VIEWPORT_WIDTH,
                height: VIEWPORT_HEIGHT,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            });

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|e| BrowserError::ConfigError(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("Browser handler event error");
                    break;
                }
            }
            debug!("Browser handler finished");
        });

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            handler: handler_task,
            config,
            _profile: profile,
        })
    }

    /// Open a page, navigate and read title and markup
    #[instrument(skip(self))]
    pub async fn snapshot(&self, url: &str) -> Result<PageSnapshot> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

        let opts = NavigationOptions::network_idle(self.config.timeout_ms);
        Self::read_page(&page, url, &opts).await
    }

    async fn read_page(page: &Page, url: &str, opts: &NavigationOptions) -> Result<PageSnapshot> {
        PageNavigator::goto(page, url, opts).await?;

        let html = page.content().await.map_err(|e| Error::cdp(e.to_string()))?;
        let title = page
            .get_title()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?
            .unwrap_or_default();

        Ok(PageSnapshot {
            title,
            html,
            selected_html: None,
        })
    }

    /// Close the browser
    #[instrument(skip(self))]
    pub async fn close(mut self) -> Result<()> {
        info!("Closing browser");

        let closed = self
            .browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()));

        let _ = tokio::time::timeout(Duration::from_secs(5), &mut self.handler).await;
        self.handler.abort();

        closed.map(|_| ())
    }

    /// Launch, read one page, and close the browser on every path
    pub async fn scrape_once(config: BrowserConfig, url: &str) -> Result<PageSnapshot> {
        let controller = Self::launch(config).await?;
        let outcome = controller.snapshot(url).await;

        if let Err(e) = controller.close().await {
            warn!("Error closing browser: {}", e);
        }
        outcome
    }
}

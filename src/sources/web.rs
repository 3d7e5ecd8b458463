//! Web pages
//!
//! A [`WebScraper`] is an ordered list of [`WebStrategy`] values tried until
//! one succeeds: the daemon-backed strategy first, reusing the logged-in
//! browser, then a one-off headless browser.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::Progress;
use crate::browser::{BrowserConfig, BrowserController};
use crate::config::Config;
use crate::daemon::{
    is_daemon_running, wait_for_daemon, BackgroundSpawner, DaemonClient, DaemonSpawner,
    STARTUP_POLLS, STARTUP_POLL_INTERVAL,
};
use crate::error::{DaemonError, Error, ExtractionError, Result};
use crate::extraction::ContentExtractor;
use crate::output::{Frontmatter, RenderedDocument};
use crate::types::ScrapeRequest;

/// File stem used when a page title sanitizes to nothing
pub const UNTITLED: &str = "untitled";

/// A scraped web page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPage {
    /// Requested URL
    pub url: String,
    /// Page title
    pub title: String,
    /// Extracted Markdown
    pub markdown: String,
}

impl WebPage {
    /// Header, `# title` heading and content
    pub fn into_document(self) -> RenderedDocument {
        let body = format!("# {}\n\n{}", self.title, self.markdown);
        RenderedDocument {
            header: Frontmatter::web(&self.url, &self.title),
            body,
            name_hint: self.title,
            fallback_name: UNTITLED.to_string(),
        }
    }
}

/// One way of turning a URL into a [`WebPage`]
#[async_trait]
pub trait WebStrategy: Send + Sync {
    /// Short name used in logs and warnings
    fn name(&self) -> &'static str;

    /// Scrape the page
    async fn fetch(&self, url: &str) -> Result<WebPage>;
}

/// Tries its strategies in order and returns the first success
pub struct WebScraper {
    strategies: Vec<Box<dyn WebStrategy>>,
    progress: Progress,
}

impl WebScraper {
    /// Chain of strategies, tried in order
    pub fn new(strategies: Vec<Box<dyn WebStrategy>>, progress: Progress) -> Self {
        Self {
            strategies,
            progress,
        }
    }

    /// Daemon first, then a standalone browser
    pub fn from_config(config: &Config, progress: Progress) -> Self {
        let daemon = DaemonStrategy::new(
            config.socket_path.clone(),
            Box::new(BackgroundSpawner),
            progress.clone(),
        );
        let standalone = StandaloneStrategy::from_config(config);
        Self::new(vec![Box::new(daemon), Box::new(standalone)], progress)
    }

    /// Run the chain; the error of the last strategy is returned when all
    /// of them fail.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<WebPage> {
        let mut last_error = None;

        for (index, strategy) in self.strategies.iter().enumerate() {
            match strategy.fetch(url).await {
                Ok(page) => {
                    debug!(strategy = strategy.name(), "Web strategy succeeded");
                    return Ok(page);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Web strategy failed");
                    if let Some(next) = self.strategies.get(index + 1) {
                        self.progress.report(&format!(
                            "Warning: {} scraping failed ({}), falling back to {} scraping",
                            strategy.name(),
                            e,
                            next.name()
                        ));
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::generic("No web scraping strategy configured")))
    }
}

/// Scrapes through the background daemon, starting it when needed
pub struct DaemonStrategy {
    socket_path: PathBuf,
    spawner: Box<dyn DaemonSpawner>,
    progress: Progress,
    startup_polls: u32,
    poll_interval: Duration,
    client: DaemonClient,
}

impl DaemonStrategy {
    /// Strategy for the daemon at `socket_path`
    pub fn new(socket_path: PathBuf, spawner: Box<dyn DaemonSpawner>, progress: Progress) -> Self {
        let client = DaemonClient::new(&socket_path);
        Self {
            socket_path,
            spawner,
            progress,
            startup_polls: STARTUP_POLLS,
            poll_interval: STARTUP_POLL_INTERVAL,
            client,
        }
    }

    /// Override how long to wait for a freshly spawned daemon
    pub fn with_startup_wait(mut self, polls: u32, interval: Duration) -> Self {
        self.startup_polls = polls;
        self.poll_interval = interval;
        self
    }

    /// Override the round-trip timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    /// Spawn the daemon unless it already answers. Returns whether it is
    /// live afterwards.
    async fn ensure_daemon(&self) -> bool {
        if is_daemon_running(&self.socket_path).await {
            return true;
        }

        self.progress.report("Starting daemon...");
        if let Err(e) = self.spawner.spawn() {
            warn!(error = %e, "Failed to spawn daemon");
            return false;
        }

        let live = wait_for_daemon(&self.socket_path, self.startup_polls, self.poll_interval).await;
        if live {
            info!("Daemon started");
            self.progress.report("Daemon started");
        }
        live
    }
}

#[async_trait]
impl WebStrategy for DaemonStrategy {
    fn name(&self) -> &'static str {
        "daemon"
    }

    async fn fetch(&self, url: &str) -> Result<WebPage> {
        if !self.ensure_daemon().await {
            return Err(DaemonError::Unavailable(self.socket_path.display().to_string()).into());
        }

        let result = self.client.scrape(&ScrapeRequest::new(url)).await?;
        Ok(WebPage {
            url: url.to_string(),
            title: result.title,
            markdown: result.markdown,
        })
    }
}

/// Scrapes in a fresh headless browser with an isolated profile
#[derive(Debug, Clone, Default)]
pub struct StandaloneStrategy {
    browser: BrowserConfig,
}

impl StandaloneStrategy {
    /// Strategy with explicit browser settings
    pub fn new(browser: BrowserConfig) -> Self {
        Self { browser }
    }

    /// Headless browser using the configured executable and timeout
    pub fn from_config(config: &Config) -> Self {
        let mut builder = BrowserConfig::builder().timeout_ms(config.navigation_timeout_ms);
        if let Ok(path) = config.find_chrome_executable() {
            builder = builder.chrome_path(path);
        }
        Self::new(builder.build())
    }
}

/// Readable content, else the whole body, else an error
pub fn extract_page_markdown(html: &str) -> Result<String> {
    ContentExtractor::extract(html)
        .or_else(|| ContentExtractor::extract_full(html))
        .ok_or_else(|| ExtractionError::NoContent.into())
}

#[async_trait]
impl WebStrategy for StandaloneStrategy {
    fn name(&self) -> &'static str {
        "standalone"
    }

    async fn fetch(&self, url: &str) -> Result<WebPage> {
        let snapshot = BrowserController::scrape_once(self.browser.clone(), url)
            .await
            .map_err(|e| Error::generic(format!("Failed to fetch page with browser: {e}")))?;

        let markdown = extract_page_markdown(&snapshot.html)?;
        Ok(WebPage {
            url: url.to_string(),
            title: snapshot.title,
            markdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::parse_document;

    #[test]
    fn test_web_page_document() {
        let page = WebPage {
            url: "https://example.com/a".into(),
            title: "Article: \"Test\"".into(),
            markdown: "Body text".into(),
        };
        let doc = page.into_document();
        assert_eq!(doc.file_stem(), "Article_Test");

        let (header, body) = parse_document(&doc.to_markdown().unwrap()).unwrap();
        assert_eq!(header.title.as_deref(), Some("Article: \"Test\""));
        assert_eq!(header.source, "web");
        assert_eq!(body, "# Article: \"Test\"\n\nBody text");
    }

    #[test]
    fn test_empty_title_falls_back() {
        let page = WebPage {
            url: "https://example.com".into(),
            title: String::new(),
            markdown: "x".into(),
        };
        assert_eq!(page.into_document().file_stem(), UNTITLED);
    }

    #[test]
    fn test_extract_page_markdown_fallbacks() {
        let md = extract_page_markdown("<html><body><p>Short</p></body></html>").unwrap();
        assert!(md.contains("Short"));

        let err = extract_page_markdown("<html><body></body></html>").unwrap_err();
        assert_eq!(err.to_string(), "Extraction error: No content could be extracted from the page");
    }
}

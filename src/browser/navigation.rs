//! Page navigation functionality
//!
//! This module handles URL navigation with a timeout and a choice of how
//! long to wait: DOM-ready for the warm daemon path, load plus network quiet
//! for the standalone path.

use crate::error::{Error, NavigationError, Result};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::Page;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

/// Interval between document readiness polls
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for page navigation
#[derive(Debug, Clone)]
pub struct NavigationOptions {
    /// Timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Wait until condition (default: DOMContentLoaded)
    pub wait_until: WaitUntil,
    /// Pause after the wait condition is met, in milliseconds (default: 0)
    pub settle_delay_ms: u64,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            wait_until: WaitUntil::DomContentLoaded,
            settle_delay_ms: 0,
        }
    }
}

impl NavigationOptions {
    /// DOM-ready navigation followed by a settle pause
    pub fn dom_ready(timeout_ms: u64, settle_delay_ms: u64) -> Self {
        Self {
            timeout_ms,
            wait_until: WaitUntil::DomContentLoaded,
            settle_delay_ms,
        }
    }

    /// Full load followed by a short network-quiet grace
    pub fn network_idle(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            wait_until: WaitUntil::NetworkIdle,
            settle_delay_ms: 0,
        }
    }
}

/// Condition to wait for after navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    /// Wait until DOMContentLoaded event fires
    DomContentLoaded,
    /// Wait until load, then 500ms of quiet
    NetworkIdle,
}

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<(), String> {
        if url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }

        if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
        {
            return Err(format!(
                "URL must start with http://, https://, or file://: {}",
                url
            ));
        }

        // Max 2048 characters is the common limit
        if url.len() > 2048 {
            return Err("URL exceeds maximum length of 2048 characters".to_string());
        }

        Ok(())
    }
}

/// Page navigator
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate `page` to `url`, bounded by `opts.timeout_ms` overall, then
    /// sleep for the settle delay.
    #[instrument(skip(page, opts), fields(wait_until = ?opts.wait_until))]
    pub async fn goto(page: &Page, url: &str, opts: &NavigationOptions) -> Result<()> {
        UrlValidator::validate(url).map_err(NavigationError::InvalidUrl)?;

        info!("Navigating to: {}", url);
        let start = Instant::now();
        let timeout = Duration::from_millis(opts.timeout_ms);

        tokio::time::timeout(timeout, Self::navigate_and_wait(page, url, opts.wait_until))
            .await
            .map_err(|_| NavigationError::Timeout(opts.timeout_ms))??;

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Navigation complete");

        if opts.settle_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(opts.settle_delay_ms)).await;
        }
        Ok(())
    }

    async fn navigate_and_wait(page: &Page, url: &str, wait_until: WaitUntil) -> Result<()> {
        match wait_until {
            WaitUntil::DomContentLoaded => {
                // Page.navigate returns once the navigation commits, without
                // waiting for the load event
                let response = page
                    .execute(NavigateParams::new(url))
                    .await
                    .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;
                if let Some(ref error_text) = response.result.error_text {
                    return Err(NavigationError::LoadFailed(error_text.clone()).into());
                }
                Self::wait_for_dom_ready(page).await
            }
            WaitUntil::NetworkIdle => {
                page.goto(url)
                    .await
                    .map_err(|e| NavigationError::LoadFailed(e.to_string()))?;
                Self::wait_for_ready(page, wait_until).await
            }
        }
    }

    /// Poll until the new document has left the `loading` state.
    async fn wait_for_dom_ready(page: &Page) -> Result<()> {
        let script = r#"
            (() => ({ href: location.href, state: document.readyState }))()
        "#;

        loop {
            // Evaluation fails transiently while the old context is torn down
            if let Ok(result) = page.evaluate(script).await {
                if let Ok(value) = result.into_value::<serde_json::Value>() {
                    let href = value["href"].as_str().unwrap_or_default();
                    let state = value["state"].as_str().unwrap_or_default();
                    if href != "about:blank" && state != "loading" && !state.is_empty() {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Wait for page to be ready based on wait_until condition
    async fn wait_for_ready(page: &Page, wait_until: WaitUntil) -> Result<()> {
        let script = match wait_until {
            WaitUntil::NetworkIdle => {
                // Approximates network idle as 500ms after load
                r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            setTimeout(() => resolve(true), 500);
                        } else {
                            window.addEventListener('load', () => {
                                setTimeout(() => resolve(true), 500);
                            });
                        }
                    })
                "#
            }
            WaitUntil::DomContentLoaded => {
                r#"
                    new Promise(resolve => {
                        if (document.readyState === 'complete') {
                            resolve(true);
                        } else {
                            window.addEventListener('load', () => resolve(true));
                        }
                    })
                "#
            }
        };

        page.evaluate(script)
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_options_default() {
        let opts = NavigationOptions::default();
        assert_eq!(opts.timeout_ms, 30000);
        assert_eq!(opts.wait_until, WaitUntil::DomContentLoaded);
        assert_eq!(opts.settle_delay_ms, 0);
    }

    #[test]
    fn test_navigation_option_presets() {
        let daemon = NavigationOptions::dom_ready(30000, 2000);
        assert_eq!(daemon.wait_until, WaitUntil::DomContentLoaded);
        assert_eq!(daemon.settle_delay_ms, 2000);

        let standalone = NavigationOptions::network_idle(30000);
        assert_eq!(standalone.wait_until, WaitUntil::NetworkIdle);
        assert_eq!(standalone.settle_delay_ms, 0);
    }

    #[test]
    fn test_url_validation_valid() {
        assert!(UrlValidator::validate("http://example.com").is_ok());
        assert!(UrlValidator::validate("https://example.com?foo=bar#x").is_ok());
        assert!(UrlValidator::validate("file:///path/to/file.html").is_ok());
    }

    #[test]
    fn test_url_validation_empty() {
        let result = UrlValidator::validate("");
        assert!(result.unwrap_err().contains("empty"));
    }

    #[test]
    fn test_url_validation_no_protocol() {
        let result = UrlValidator::validate("example.com");
        assert!(result.unwrap_err().contains("must start with"));
        assert!(UrlValidator::validate("ftp://example.com").is_err());
    }

    #[test]
    fn test_url_validation_too_long() {
        let long_url = format!("https://example.com/{}", "a".repeat(3000));
        let result = UrlValidator::validate(&long_url);
        assert!(result.unwrap_err().contains("maximum length"));
    }
}

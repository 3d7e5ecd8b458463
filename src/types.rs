//! Wire types shared by the daemon and its clients

use serde::{Deserialize, Serialize};

/// Body of `POST /scrape`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Page to scrape
    pub url: String,
    /// Optional CSS selector narrowing extraction to one element
    #[serde(default)]
    pub selector: Option<String>,
}

impl ScrapeRequest {
    /// Request for a whole page
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: None,
        }
    }

    /// Narrow extraction to a selector
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }
}

/// Outcome of one scrape attempt.
///
/// On success `error` is `None` and `markdown` carries the content; on
/// failure `error` holds the message and `title`/`markdown` are empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResult {
    /// Requested URL
    pub url: String,
    /// Page title
    pub title: String,
    /// Extracted Markdown
    pub markdown: String,
    /// Failure message
    pub error: Option<String>,
}

impl ScrapeResult {
    /// Successful scrape
    pub fn success(
        url: impl Into<String>,
        title: impl Into<String>,
        markdown: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            markdown: markdown.into(),
            error: None,
        }
    }

    /// Failed scrape
    pub fn failure(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            markdown: String::new(),
            error: Some(error.into()),
        }
    }

    /// Whether this result carries an error
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

//! URL classification
//!
//! Maps a URL to the strategy that knows how to turn it into Markdown.
//! Only the host and the path take part; query strings and fragments never
//! influence the outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Host markers of the supported video platform
const VIDEO_HOST_MARKERS: [&str; 2] = ["youtube.com", "youtu.be"];

/// Path suffix of the supported document format
const DOCUMENT_SUFFIX: &str = ".pdf";

/// Handling strategy for a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlKind {
    /// Video page, handled by the transcript fetcher
    Video,
    /// Remote document, handled by the document converter
    Document,
    /// Everything else, rendered in a browser
    Web,
}

impl fmt::Display for UrlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UrlKind::Video => "video",
            UrlKind::Document => "document",
            UrlKind::Web => "web",
        };
        f.write_str(name)
    }
}

/// Classify a URL. Total: unparseable input is treated as a web page.
pub fn classify(url: &str) -> UrlKind {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return UrlKind::Web;
    };

    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    if VIDEO_HOST_MARKERS.iter().any(|marker| host.contains(marker)) {
        return UrlKind::Video;
    }

    if parsed.path().to_ascii_lowercase().ends_with(DOCUMENT_SUFFIX) {
        return UrlKind::Document;
    }

    UrlKind::Web
}

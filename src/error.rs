//! Error types for scrape-to-md
//!
//! This module provides the error hierarchy shared by the dispatcher, the
//! daemon and the individual converters, built with `thiserror`.

use thiserror::Error;

/// The main error type for scrape-to-md operations
#[derive(Error, Debug)]
pub enum Error {
    /// Browser-related errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Navigation errors
    #[error("Navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Content extraction errors
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Daemon communication errors
    #[error("Daemon error: {0}")]
    Daemon(#[from] DaemonError),

    /// Video source errors
    #[error("{0}")]
    Video(#[from] VideoError),

    /// Document source errors
    #[error("{0}")]
    Document(#[from] DocumentError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// No Chrome/Chromium executable could be located
    #[error("Chrome executable not found. Searched: {0}")]
    ExecutableNotFound(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// The debugging endpoint refused the connection
    #[error("Connection refused by browser at {endpoint}: {message}")]
    ConnectionRefused {
        /// Endpoint that was dialed
        endpoint: String,
        /// Underlying failure
        message: String,
    },

    /// Connecting kept failing after relaunching the browser
    #[error("Failed to connect to Chrome after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Last failure seen
        message: String,
    },

    /// The browser process never exposed its debugging endpoint
    #[error("Chrome failed to start within {0} seconds")]
    StartupTimeout(u64),

    /// Connected, but the browser has no window to scrape in
    #[error("No browser windows available. Open a Chrome window and try again.")]
    NoBrowserWindows,

    /// Browser connection lost
    #[error("Browser connection lost")]
    ConnectionLost,

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),
}

/// Navigation errors
#[derive(Error, Debug)]
pub enum NavigationError {
    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Navigation timeout
    #[error("Navigation timed out after {0}ms")]
    Timeout(u64),

    /// Page load failed
    #[error("Page load failed: {0}")]
    LoadFailed(String),
}

/// Content extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Nothing readable survived extraction
    #[error("No content could be extracted from the page")]
    NoContent,
}

/// Errors talking to the background daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    /// Socket missing or not accepting connections
    #[error("Daemon is not reachable at {0}")]
    Unavailable(String),

    /// Daemon is already serving on the socket
    #[error("Daemon already running at {0}")]
    AlreadyRunning(String),

    /// Daemon answered with a non-success status
    #[error("Daemon returned status {status}: {body}")]
    BadStatus {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The daemon reported a scrape failure in the result envelope
    #[error("Daemon scraping failed: {0}")]
    ScrapeFailed(String),

    /// Transport or framing problem
    #[error("Failed to connect to daemon: {0}")]
    Protocol(String),

    /// Round trip exceeded its budget
    #[error("Daemon request timed out after {0}s")]
    Timeout(u64),
}

/// Video source errors
#[derive(Error, Debug)]
pub enum VideoError {
    /// URL shape not recognized
    #[error("Could not extract video ID from URL: {0}")]
    InvalidVideoUrl(String),

    /// Metadata tool failed
    #[error("Failed to fetch video metadata: {0}")]
    MetadataFailed(String),
}

/// Document source errors
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Download of the remote document failed
    #[error("Failed to download PDF: {0}")]
    DownloadFailed(String),

    /// The conversion library failed
    #[error("Failed to convert PDF: {0}")]
    ConversionFailed(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No home directory could be determined
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file content is not valid
    #[error("Failed to load config from {path}: {message}")]
    Malformed {
        /// File that failed to parse
        path: String,
        /// Parser message
        message: String,
    },
}

/// Result type alias for scrape-to-md operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }

    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }

    /// Whether this error belongs to the refused-connection class that
    /// warrants relaunching the browser before retrying.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Error::Browser(BrowserError::ConnectionRefused { .. }) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            Error::Http(e) => e.is_connect(),
            Error::Cdp(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("refused") || msg.contains("connect")
            }
            _ => false,
        }
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Browser(BrowserError::LaunchFailed("no chrome".to_string()));
        assert!(err.to_string().contains("Failed to launch browser"));
        assert!(err.to_string().contains("no chrome"));
    }

    #[test]
    fn test_no_windows_message() {
        let err: Error = BrowserError::NoBrowserWindows.into();
        assert!(err.to_string().contains("No browser windows available"));
    }

    #[test]
    fn test_document_errors_are_unprefixed() {
        let err: Error = DocumentError::DownloadFailed("404".to_string()).into();
        assert_eq!(err.to_string(), "Failed to download PDF: 404");
    }

    #[test]
    fn test_connection_refused_classification() {
        let refused: Error = BrowserError::ConnectionRefused {
            endpoint: "127.0.0.1:9222".to_string(),
            message: "refused".to_string(),
        }
        .into();
        assert!(refused.is_connection_refused());

        let io = Error::Io(std::io::Error::from(std::io::ErrorKind::ConnectionRefused));
        assert!(io.is_connection_refused());

        assert!(Error::cdp("WS connect failed").is_connection_refused());
        assert!(!Error::cdp("Protocol mismatch").is_connection_refused());
        assert!(!Error::generic("boom").is_connection_refused());
    }

    #[test]
    fn test_daemon_status_error() {
        let err = DaemonError::BadStatus {
            status: 500,
            body: "Internal".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("Internal"));
    }
}

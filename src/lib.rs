//! scrape-to-md - Web pages, videos and PDF documents to Markdown files
//!
//! A URL is classified, handed to the matching source and written as a
//! Markdown file with a YAML metadata header. Web pages go through a
//! long-lived daemon that keeps one Chrome instance (and its logged-in
//! sessions) warm, falling back to a one-off headless browser.
//!
//! # Architecture
//!
//! ```text
//! CLI ──▶ Dispatcher ──▶ classify()
//!              │
//!              ├── video ──────▶ VideoScraper (transcript + metadata)
//!              ├── document ───▶ DocumentScraper (download + convert)
//!              └── web ────────▶ WebScraper
//!                                  ├── DaemonStrategy ──▶ Unix socket ──▶ SessionManager (CDP)
//!                                  └── StandaloneStrategy (headless Chrome)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scrape_to_md::config::Config;
//! use scrape_to_md::dispatch::Dispatcher;
//! use scrape_to_md::sources::Progress;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?.config;
//!     let dispatcher = Dispatcher::from_config(&config, Progress::stderr());
//!
//!     let path = dispatcher
//!         .scrape_to_file("https://example.com/article", &config.output_dir)
//!         .await?;
//!     println!("{}", path.display());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod classify;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod output;
pub mod sources;
pub mod types;

// Re-exports for convenience
pub use browser::{BrowserController, ChromeSession, SessionManager};
pub use classify::{classify, UrlKind};
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use extraction::ContentExtractor;
pub use types::{ScrapeRequest, ScrapeResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

//! Browser automation module
//!
//! Two ways of rendering a page through ChromiumOxide: a persistent,
//! self-healing session attached to the user's Chrome (used by the daemon),
//! and an ephemeral headless browser for one-off scrapes.

pub mod cdp;
pub mod controller;
pub mod navigation;
pub mod process;
pub mod session;

pub use cdp::{CdpConnection, ChromeLauncher};
pub use controller::{BrowserConfig, BrowserController};
pub use navigation::{NavigationOptions, PageNavigator, WaitUntil};
pub use session::{
    BrowserConnection, BrowserLauncher, ConnectionHealth, PageScraper, PageSnapshot, RetryPolicy,
    SessionManager, SessionState,
};

/// Session manager backed by a real Chrome
pub type ChromeSession = SessionManager<ChromeLauncher>;

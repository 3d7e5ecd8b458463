//! Browser session manager tests
//!
//! A scripted launcher and connection stand in for Chrome so the start,
//! retry and reconnect paths can be driven deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scrape_to_md::browser::{
    BrowserConnection, BrowserLauncher, ConnectionHealth, NavigationOptions, PageScraper,
    PageSnapshot, RetryPolicy, SessionManager, SessionState,
};
use scrape_to_md::error::{BrowserError, Error, Result};

/// What the next `connect` call does
enum ConnectStep {
    Refused,
    Fail,
    Connect {
        healths: Vec<ConnectionHealth>,
        default: ConnectionHealth,
    },
}

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    connects: AtomicUsize,
    terminations: AtomicUsize,
    disconnects: AtomicUsize,
}

struct FakeConnection {
    healths: Mutex<VecDeque<ConnectionHealth>>,
    default: ConnectionHealth,
    snapshot_error: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl BrowserConnection for FakeConnection {
    async fn health(&self) -> ConnectionHealth {
        self.healths.lock().pop_front().unwrap_or(self.default)
    }

    async fn snapshot(
        &self,
        url: &str,
        selector: Option<&str>,
        _nav: &NavigationOptions,
    ) -> Result<PageSnapshot> {
        if self.snapshot_error {
            return Err(Error::generic(format!("Navigation to {url} failed")));
        }
        Ok(PageSnapshot {
            title: "Fake Page".to_string(),
            html: "<html><body><nav>menu</nav><p>Full page body</p></body></html>".to_string(),
            selected_html: selector.map(|_| "<p>Selected part</p>".to_string()),
        })
    }

    async fn disconnect(&self) -> Result<()> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeLauncher {
    reachable: AtomicBool,
    launch_makes_reachable: bool,
    snapshot_error: bool,
    script: Mutex<VecDeque<ConnectStep>>,
    counters: Arc<Counters>,
}

impl FakeLauncher {
    fn new(reachable: bool, script: Vec<ConnectStep>) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            launch_makes_reachable: true,
            snapshot_error: false,
            script: Mutex::new(script.into()),
            counters: Arc::new(Counters::default()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    type Connection = FakeConnection;

    fn endpoint(&self) -> String {
        "fake:9222".to_string()
    }

    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn launch(&self) -> Result<()> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if self.launch_makes_reachable {
            self.reachable.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn connect(&self) -> Result<FakeConnection> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front().unwrap_or(ConnectStep::Connect {
            healths: Vec::new(),
            default: ConnectionHealth::Ready,
        });

        match step {
            ConnectStep::Refused => Err(BrowserError::ConnectionRefused {
                endpoint: self.endpoint(),
                message: "Connection refused".to_string(),
            }
            .into()),
            ConnectStep::Fail => Err(Error::cdp("protocol mismatch")),
            ConnectStep::Connect { healths, default } => Ok(FakeConnection {
                healths: Mutex::new(healths.into()),
                default,
                snapshot_error: self.snapshot_error,
                counters: Arc::clone(&self.counters),
            }),
        }
    }

    fn terminate(&self) {
        self.counters.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        connect_attempts: 3,
        retry_pause: Duration::from_millis(1),
        startup_polls: 3,
        poll_interval: Duration::from_millis(1),
    }
}

fn manager(launcher: FakeLauncher) -> SessionManager<FakeLauncher> {
    SessionManager::new(launcher, NavigationOptions::dom_ready(1_000, 0))
        .with_retry_policy(fast_policy())
}

fn ready() -> ConnectStep {
    ConnectStep::Connect {
        healths: Vec::new(),
        default: ConnectionHealth::Ready,
    }
}

#[tokio::test]
async fn test_start_launches_unreachable_browser() {
    let session = manager(FakeLauncher::new(false, vec![ready()]));
    assert_eq!(session.state(), SessionState::Uninitialized);

    session.start().await.unwrap();

    let counters = &session.launcher().counters;
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
    assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_reuses_reachable_browser() {
    let session = manager(FakeLauncher::new(true, vec![ready()]));
    session.start().await.unwrap();
    assert_eq!(session.launcher().counters.launches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_startup_timeout() {
    let mut launcher = FakeLauncher::new(false, vec![ready()]);
    launcher.launch_makes_reachable = false;
    let session = manager(launcher);

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, Error::Browser(BrowserError::StartupTimeout(_))));
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.launcher().counters.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refused_connection_restarts_and_retries() {
    let session = manager(FakeLauncher::new(
        true,
        vec![ConnectStep::Refused, ConnectStep::Refused, ready()],
    ));

    session.start().await.unwrap();

    let counters = &session.launcher().counters;
    assert_eq!(counters.connects.load(Ordering::SeqCst), 3);
    assert_eq!(counters.terminations.load(Ordering::SeqCst), 2);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_refused_connection_exhausts_attempts() {
    let session = manager(FakeLauncher::new(
        true,
        vec![
            ConnectStep::Refused,
            ConnectStep::Refused,
            ConnectStep::Refused,
        ],
    ));

    let err = session.start().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Browser(BrowserError::RetriesExhausted { attempts: 3, .. })
    ));
    assert_eq!(session.launcher().counters.connects.load(Ordering::SeqCst), 3);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[tokio::test]
async fn test_other_connect_errors_fail_fast() {
    let session = manager(FakeLauncher::new(true, vec![ConnectStep::Fail, ready()]));

    let err = session.start().await.unwrap_err();
    assert!(err.to_string().contains("protocol mismatch"));
    assert_eq!(session.launcher().counters.connects.load(Ordering::SeqCst), 1);
    assert_eq!(session.launcher().counters.terminations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_scrape_reconnects_when_no_contexts() {
    let session = manager(FakeLauncher::new(
        true,
        vec![
            ConnectStep::Connect {
                healths: Vec::new(),
                default: ConnectionHealth::NoContexts,
            },
            ready(),
        ],
    ));
    session.start().await.unwrap();

    let result = session.scrape("https://example.com", None).await;

    assert!(!result.is_error(), "unexpected error: {:?}", result.error);
    assert_eq!(result.title, "Fake Page");
    assert!(result.markdown.contains("Full page body"));

    let counters = &session.launcher().counters;
    assert_eq!(counters.connects.load(Ordering::SeqCst), 2);
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn test_scrape_reports_missing_windows_after_reconnect() {
    let no_contexts = || ConnectStep::Connect {
        healths: Vec::new(),
        default: ConnectionHealth::NoContexts,
    };
    let session = manager(FakeLauncher::new(true, vec![no_contexts(), no_contexts()]));
    session.start().await.unwrap();

    let result = session.scrape("https://example.com", None).await;
    let message = result.error.unwrap();
    assert!(message.contains("No browser windows"), "{message}");
    assert!(result.markdown.is_empty());
}

#[tokio::test]
async fn test_scrape_connects_lazily() {
    let session = manager(FakeLauncher::new(true, Vec::new()));

    let result = session.scrape("https://example.com", None).await;
    assert!(!result.is_error());
    assert_eq!(session.launcher().counters.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scrape_with_selector_uses_selected_markup() {
    let session = manager(FakeLauncher::new(true, vec![ready()]));

    let result = session.scrape("https://example.com", Some("#main")).await;
    assert!(result.markdown.contains("Selected part"));
    assert!(!result.markdown.contains("Full page body"));
}

#[tokio::test]
async fn test_scrape_never_propagates_errors() {
    let mut launcher = FakeLauncher::new(true, vec![ready()]);
    launcher.snapshot_error = true;
    let session = manager(launcher);

    let result = session.scrape("https://example.com/broken", None).await;
    assert_eq!(result.url, "https://example.com/broken");
    assert_eq!(
        result.error.as_deref(),
        Some("Navigation to https://example.com/broken failed")
    );
    assert!(result.title.is_empty());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_reconnect() {
    let session = Arc::new(manager(FakeLauncher::new(
        true,
        vec![
            ConnectStep::Connect {
                healths: Vec::new(),
                default: ConnectionHealth::Closed,
            },
            ready(),
        ],
    )));
    session.start().await.unwrap();

    let (a, b) = tokio::join!(session.ensure_connected(), session.ensure_connected());
    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(session.launcher().counters.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stop_disconnects_and_terminates() {
    let session = manager(FakeLauncher::new(true, vec![ready()]));
    session.start().await.unwrap();

    session.stop().await;

    let counters = &session.launcher().counters;
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(counters.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(counters.terminations.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_page_scraper_trait_object() {
    let session: Arc<dyn PageScraper> = Arc::new(manager(FakeLauncher::new(true, vec![ready()])));

    let result = session.scrape("https://example.com", None).await;
    assert!(!result.is_error());
    assert_eq!(session.state(), SessionState::Connected);
}

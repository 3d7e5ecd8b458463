//! HTTP handlers for the scrape daemon.
//!
//! Routes served over the daemon's Unix socket:
//! - `GET /health` - liveness, always `200` once the process is up
//! - `GET /status` - session state and scrape counters
//! - `POST /scrape` - scrape one page in the persistent browser
//!
//! # Architecture
//!
//! ```text
//! Request ──> Axum Router ──> scrape_handler ──> ServerContext
//!                                   │                 │
//!                                   ▼                 ▼
//!                             ScrapeResult      Arc<dyn PageScraper>
//!                                   │            + counters
//!                                   ▼
//!                             JSON Response
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::browser::{PageScraper, SessionState};
use crate::types::{ScrapeRequest, ScrapeResult};

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Liveness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Daemon status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server name
    pub name: String,

    /// Server version (from Cargo.toml)
    pub version: String,

    /// Daemon process ID
    pub pid: u32,

    /// Server uptime in seconds
    pub uptime_seconds: u64,

    /// Browser session lifecycle state
    pub session_state: SessionState,

    /// Scrape requests handled
    pub scrapes_total: u64,

    /// Scrape requests that produced an error result
    pub scrape_failures: u64,
}

// ============================================================================
// Server Context
// ============================================================================

/// State shared by every handler for the lifetime of the daemon.
///
/// Built once at startup and handed to the router; there is no global
/// scraper instance.
pub struct ServerContext {
    /// Server start time for uptime calculation
    start_time: Instant,

    /// The process-wide page scraper
    scraper: Arc<dyn PageScraper>,

    /// Total scrape requests
    scrapes_total: AtomicU64,

    /// Scrape requests with an error result
    scrape_failures: AtomicU64,
}

impl ServerContext {
    /// Create a context around the daemon's scraper
    pub fn new(scraper: Arc<dyn PageScraper>) -> Self {
        Self {
            start_time: Instant::now(),
            scraper,
            scrapes_total: AtomicU64::new(0),
            scrape_failures: AtomicU64::new(0),
        }
    }

    /// Get the server uptime in seconds.
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Count a handled scrape and return the new total.
    #[inline]
    pub fn record_scrape(&self, failed: bool) -> u64 {
        if failed {
            self.scrape_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.scrapes_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get the total number of scrapes handled.
    #[inline]
    pub fn scrapes_total(&self) -> u64 {
        self.scrapes_total.load(Ordering::Relaxed)
    }

    /// Get the number of failed scrapes.
    #[inline]
    pub fn scrape_failures(&self) -> u64 {
        self.scrape_failures.load(Ordering::Relaxed)
    }

    /// Snapshot of the daemon status
    pub fn status(&self) -> StatusResponse {
        StatusResponse {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
            pid: std::process::id(),
            uptime_seconds: self.uptime_seconds(),
            session_state: self.scraper.state(),
            scrapes_total: self.scrapes_total(),
            scrape_failures: self.scrape_failures(),
        }
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("uptime_seconds", &self.uptime_seconds())
            .field("scrapes_total", &self.scrapes_total())
            .field("scrape_failures", &self.scrape_failures())
            .finish()
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// # Route
/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// Status endpoint handler.
///
/// # Route
/// `GET /status`
#[instrument(skip_all)]
pub async fn status_handler(State(ctx): State<Arc<ServerContext>>) -> impl IntoResponse {
    debug!("Status check requested");
    (StatusCode::OK, Json(ctx.status()))
}

/// Scrape endpoint handler.
///
/// Failures inside the scrape come back as `200` with `error` set; only
/// malformed requests get a non-success status (from the JSON extractor).
///
/// # Route
/// `POST /scrape`
#[instrument(skip_all, fields(url = %request.url))]
pub async fn scrape_handler(
    State(ctx): State<Arc<ServerContext>>,
    Json(request): Json<ScrapeRequest>,
) -> Json<ScrapeResult> {
    info!("Scrape requested");

    let result = ctx
        .scraper
        .scrape(&request.url, request.selector.as_deref())
        .await;
    ctx.record_scrape(result.is_error());

    Json(result)
}

// ============================================================================
// Router Setup
// ============================================================================

/// Build the daemon router.
///
/// # Routes
/// - `GET /health`
/// - `GET /status`
/// - `POST /scrape`
pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/scrape", post(scrape_handler))
        .with_state(ctx)
}

// ============================================================================
// Tests
// ============================================================================

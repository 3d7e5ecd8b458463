//! Client side of the daemon socket protocol
//!
//! Speaks HTTP/1.1 over the daemon's Unix socket with hyper.

use std::path::{Path, PathBuf};
use std::time::Duration;

use http::header::{CONTENT_TYPE, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::{debug, instrument};

use super::handlers::StatusResponse;
use crate::error::{DaemonError, Result};
use crate::types::{ScrapeRequest, ScrapeResult};

/// Total budget of one request, connection included
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the scrape daemon
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl DaemonClient {
    /// Client for the daemon listening on `socket_path`
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: REQUEST_TIMEOUT,
        }
    }

    /// Override the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Socket this client talks to
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes)> {
        tokio::time::timeout(self.timeout, self.send(method, path, body))
            .await
            .map_err(|_| DaemonError::Timeout(self.timeout.as_secs()))?
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes)> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            DaemonError::Unavailable(format!("{} ({})", self.socket_path.display(), e))
        })?;

        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| DaemonError::Protocol(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("Daemon connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header(HOST, "localhost")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body.unwrap_or_default())))
            .map_err(|e| DaemonError::Protocol(e.to_string()))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| DaemonError::Protocol(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DaemonError::Protocol(e.to_string()))?
            .to_bytes();

        Ok((status, bytes))
    }

    async fn get_ok(&self, path: &str) -> Result<Bytes> {
        let (status, body) = self.request(Method::GET, path, None).await?;
        if status != StatusCode::OK {
            return Err(bad_status(status, &body));
        }
        Ok(body)
    }

    /// `GET /health`
    pub async fn health(&self) -> Result<()> {
        self.get_ok("/health").await.map(|_| ())
    }

    /// `GET /status`
    pub async fn status(&self) -> Result<StatusResponse> {
        let body = self.get_ok("/status").await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// `POST /scrape`, treating an `error` in the result as a failure
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResult> {
        let payload = serde_json::to_vec(request)?;
        let (status, body) = self
            .request(Method::POST, "/scrape", Some(payload))
            .await?;

        if status != StatusCode::OK {
            return Err(bad_status(status, &body));
        }

        let result: ScrapeResult = serde_json::from_slice(&body)?;
        if let Some(error) = result.error {
            return Err(DaemonError::ScrapeFailed(error).into());
        }
        Ok(result)
    }
}

fn bad_status(status: StatusCode, body: &[u8]) -> crate::error::Error {
    DaemonError::BadStatus {
        status: status.as_u16(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_missing_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let client = DaemonClient::new(dir.path().join("nope.sock"));

        let err = client.health().await.unwrap_err();
        assert!(matches!(err, Error::Daemon(DaemonError::Unavailable(_))));
    }

    #[test]
    fn test_default_timeout() {
        let client = DaemonClient::new("/tmp/x.sock");
        assert_eq!(client.timeout, REQUEST_TIMEOUT);
        let client = client.with_timeout(Duration::from_secs(1));
        assert_eq!(client.timeout, Duration::from_secs(1));
        assert_eq!(client.socket_path(), Path::new("/tmp/x.sock"));
    }
}

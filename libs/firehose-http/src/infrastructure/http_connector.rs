//! HTTP(S) Stream Connector Implementation
//!
//! This module implements the `StreamConnector` and `ChunkSource` ports using
//! reqwest. It opens the long-lived streaming request and converts every
//! transport failure into a domain `StreamError`.

use std::time::Duration;

use bytes::Bytes;
use firehose_domain::{ChunkSource, StreamConnector, StreamError};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONNECTION};
use reqwest::{Client, Response};
use tracing::{debug, info, instrument, warn};

use super::classify::{classify, describe};

/// Connection parameters of the upstream feed
#[derive(Clone)]
pub struct HttpStreamConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Keep-alive interval of the feed; reads time out one second after it (default: 30s)
    pub keep_alive: Duration,
}

impl HttpStreamConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            keep_alive: Duration::from_secs(30),
        }
    }

    /// Read timeout used to detect a dead peer
    pub fn read_timeout(&self) -> Duration {
        self.keep_alive + Duration::from_secs(1)
    }
}

impl std::fmt::Debug for HttpStreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// reqwest-based implementation of the StreamConnector port
///
/// ## Protocol
///
/// Every session is a GET carrying:
/// - `Accept: application/json`
/// - `Connection: Keep-Alive`
/// - `Accept-Encoding: gzip`
/// - `Authorization: Basic <base64(user:pass)>`
///
/// The client is built without transparent decompression, so a gzip-framed
/// body reaches the domain layer untouched.
///
/// ## Error Handling
///
/// Non-success statuses become `StreamError::Http`, everything else is sorted
/// into TLS, connection and incomplete-read failures.
#[derive(Clone)]
pub struct HttpStreamConnector {
    client: Client,
    config: HttpStreamConfig,
}

impl HttpStreamConnector {
    /// Create a new connector
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use firehose_http::{HttpStreamConfig, HttpStreamConnector};
    ///
    /// let config = HttpStreamConfig::new(
    ///     "https://stream.example.com/track/prod.json",
    ///     "collector",
    ///     "secret",
    /// );
    /// let connector = HttpStreamConnector::new(config).unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Connection` if the HTTP client cannot be built.
    pub fn new(config: HttpStreamConfig) -> Result<Self, StreamError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONNECTION, HeaderValue::from_static("Keep-Alive"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.read_timeout())
            .build()
            .map_err(|e| {
                StreamError::connection(format!("failed to build HTTP client: {}", describe(&e)))
            })?;

        info!(url = %config.url, keep_alive_secs = config.keep_alive.as_secs(), "Initializing HttpStreamConnector");
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpStreamConfig {
        &self.config
    }
}

impl StreamConnector for HttpStreamConnector {
    type Source = HttpChunkSource;

    #[instrument(skip(self), fields(url = %self.config.url))]
    async fn connect(&self) -> Result<HttpChunkSource, StreamError> {
        let read_timeout = self.config.read_timeout();
        let request = self
            .client
            .get(&self.config.url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send();

        let response = match tokio::time::timeout(read_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(error = %describe(&err), "Request failed");
                return Err(classify(err));
            }
            Err(_) => {
                return Err(StreamError::connection(format!(
                    "no response within {}s",
                    read_timeout.as_secs()
                )))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown status");
            warn!(status = status.as_u16(), reason, "Upstream rejected the stream request");
            return Err(StreamError::http(status.as_u16(), reason));
        }

        debug!(status = status.as_u16(), "Stream opened");
        Ok(HttpChunkSource {
            response: Some(response),
            read_timeout,
        })
    }

    fn endpoint(&self) -> &str {
        &self.config.url
    }
}

/// Body of an open streaming response
pub struct HttpChunkSource {
    response: Option<Response>,
    read_timeout: Duration,
}

impl ChunkSource for HttpChunkSource {
    async fn next_chunk(&mut self) -> Result<Bytes, StreamError> {
        let read_timeout = self.read_timeout;
        let Some(response) = self.response.as_mut() else {
            return Ok(Bytes::new());
        };

        loop {
            match tokio::time::timeout(read_timeout, response.chunk()).await {
                Ok(Ok(Some(chunk))) if chunk.is_empty() => continue,
                Ok(Ok(Some(chunk))) => return Ok(chunk),
                Ok(Ok(None)) => {
                    self.response = None;
                    return Ok(Bytes::new());
                }
                Ok(Err(err)) => return Err(classify(err)),
                Err(_) => {
                    return Err(StreamError::connection(format!(
                        "read timed out after {}s without data",
                        read_timeout.as_secs()
                    )))
                }
            }
        }
    }

    fn close(&mut self) {
        if self.response.take().is_some() {
            debug!("Stream connection closed");
        }
    }
}

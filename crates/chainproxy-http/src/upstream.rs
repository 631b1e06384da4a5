//! HTTP upstream backed by `reqwest`.
//!
//! One shared connection pool for every endpoint. Any HTTP status is
//! returned as-is; only connection-level problems become errors. The
//! per-attempt deadline is enforced by the dispatcher, so the client itself
//! only bounds connection setup.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use chainproxy_core::error::ProxyError;
use chainproxy_core::upstream::{Upstream, UpstreamReply};

/// Configuration for `HttpUpstream`.
#[derive(Debug, Clone)]
pub struct HttpUpstreamConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpUpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("chainproxy/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Upstream that POSTs JSON-RPC bodies over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    http: reqwest::Client,
    connect_timeout: Duration,
}

impl HttpUpstream {
    pub fn new(config: HttpUpstreamConfig) -> Result<Self, ProxyError> {
        let connect_timeout = config.connect_timeout;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent)
            .build()
            .map_err(|e| ProxyError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            connect_timeout,
        })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self, ProxyError> {
        Self::new(HttpUpstreamConfig::default())
    }

    fn error(&self, url: &str, e: reqwest::Error) -> ProxyError {
        if e.is_timeout() {
            ProxyError::Timeout {
                url: url.to_string(),
                ms: self.connect_timeout.as_millis() as u64,
            }
        } else {
            ProxyError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn post(&self, url: &str, body: Bytes) -> Result<UpstreamReply, ProxyError> {
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| self.error(url, e))?;

        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| self.error(url, e))?;
        tracing::trace!(url, status, bytes = body.len(), "upstream replied");
        Ok(UpstreamReply { status, body })
    }
}

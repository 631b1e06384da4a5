//! The `Upstream` trait: how the dispatcher reaches an endpoint.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ProxyError;

/// Raw answer from an endpoint: HTTP status plus body bytes.
///
/// Classification (429, 5xx, 4xx, JSON decoding) is the dispatcher's job.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: Bytes,
}

impl UpstreamReply {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one JSON-RPC body to one endpoint.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` for use across Tokio tasks.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn Upstream>`.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// POST `body` to `url` with `Content-Type: application/json`.
    ///
    /// Only connection-level failures are errors ([`ProxyError::Http`] or
    /// [`ProxyError::Timeout`]); any HTTP status is an `Ok` reply.
    async fn post(&self, url: &str, body: Bytes) -> Result<UpstreamReply, ProxyError>;
}

//! Proxy error taxonomy.

use thiserror::Error;

use crate::policy::FailureKind;

/// Errors that can occur while proxying a JSON-RPC call.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Endpoint answered HTTP 429.
    #[error("Rate limit exceeded (endpoint: {url})")]
    RateLimited { url: String },

    /// Endpoint answered HTTP 5xx.
    #[error("Server error {status} from endpoint: {url}")]
    ServerError { url: String, status: u16 },

    /// No response within the per-attempt timeout.
    #[error("Request to {url} timed out after {ms}ms")]
    Timeout { url: String, ms: u64 },

    /// Connection refused, DNS failure, unreadable or non-JSON body.
    #[error("HTTP error from {url}: {reason}")]
    Http { url: String, reason: String },

    /// Endpoint refused the request itself (non-429 4xx). Not retried.
    #[error("Endpoint {url} rejected the request with HTTP {status}")]
    UpstreamRejected { url: String, status: u16 },

    /// Every candidate endpoint failed for this call.
    #[error("All endpoints unavailable after {attempts} attempt(s): {last}")]
    AllEndpointsUnavailable {
        attempts: usize,
        #[source]
        last: Box<ProxyError>,
    },

    /// Route selection produced no endpoint at all.
    #[error("No endpoint configured for method {method}")]
    NoCandidates { method: String },

    /// The sequential queue's drain task is gone.
    #[error("Request queue closed")]
    QueueClosed,

    /// Invalid endpoint or proxy configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be (de)serialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl ProxyError {
    /// Classifies a node-side failure for backoff purposes.
    ///
    /// Returns `None` for errors that say nothing about the endpoint's
    /// health (rejections, exhaustion, local errors).
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::RateLimited { .. } => Some(FailureKind::RateLimit),
            Self::ServerError { .. } => Some(FailureKind::ServerError),
            Self::Timeout { .. } => Some(FailureKind::Timeout),
            Self::Http { .. } => Some(FailureKind::Transport),
            _ => None,
        }
    }

    /// Returns `true` if the next candidate endpoint should be tried.
    pub fn is_node_failure(&self) -> bool {
        self.failure_kind().is_some()
    }

    /// Returns `true` if this error, or the last error behind an
    /// exhaustion, is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::AllEndpointsUnavailable { last, .. } => last.is_timeout(),
            _ => false,
        }
    }
}

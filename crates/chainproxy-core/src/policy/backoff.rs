//! Per-failure-kind backoff windows.
//!
//! Rate limits back off exponentially with the endpoint's failure count,
//! everything else gets a flat window.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for any window, whatever the configuration says.
const MAX_WINDOW_MS: u64 = 24 * 60 * 60 * 1_000;

/// Why an attempt against an endpoint failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 429.
    RateLimit,
    /// HTTP 5xx.
    ServerError,
    /// No response within the request timeout.
    Timeout,
    /// Connection-level or body-decoding failure.
    Transport,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimit => write!(f, "rate-limit"),
            Self::ServerError => write!(f, "server-error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// Backoff window lengths, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Unit of the exponential rate-limit window.
    pub rate_limit_base_ms: u64,
    /// Exponent cap: the rate-limit window never exceeds `2^cap * base`.
    pub rate_limit_max_exponent: u32,
    /// Flat window after a 5xx.
    pub server_error_ms: u64,
    /// Flat window after a timeout.
    pub timeout_ms: u64,
    /// Flat window after a transport failure.
    pub transport_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            rate_limit_base_ms: 1_000,
            rate_limit_max_exponent: 6,
            server_error_ms: 2_000,
            timeout_ms: 3_000,
            transport_ms: 2_000,
        }
    }
}

impl BackoffPolicy {
    /// Returns the backoff window for a failure of `kind`.
    ///
    /// `failures` is the endpoint's failure count *after* this failure was
    /// counted, so consecutive rate limits keep lengthening the wait.
    pub fn window(&self, kind: FailureKind, failures: u32) -> Duration {
        let ms = match kind {
            FailureKind::RateLimit => {
                let exp = failures.min(self.rate_limit_max_exponent);
                2u64.saturating_pow(exp)
                    .saturating_mul(self.rate_limit_base_ms)
            }
            FailureKind::ServerError => self.server_error_ms,
            FailureKind::Timeout => self.timeout_ms,
            FailureKind::Transport => self.transport_ms,
        };
        Duration::from_millis(ms.min(MAX_WINDOW_MS))
    }
}

//! Backoff policy applied to endpoints after a failed attempt.
//!
//! ```text
//! attempt fails → [FailureKind] → [BackoffPolicy::window] → HealthTracker
//! ```

pub mod backoff;

pub use backoff::{BackoffPolicy, FailureKind};

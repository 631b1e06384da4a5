//! Per-endpoint health: failure counter plus backoff window.
//!
//! Transitions:
//! - failure: `failures += 1`, backoff window set from the failure kind
//! - success: `failures -= 1` (floored at 0), backoff window untouched
//! - forced reset: `failures = 0`, backoff cleared
//!
//! An endpoint is eligible for selection once its backoff window has passed.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::endpoint::{EndpointId, EndpointRegistry};
use crate::policy::{BackoffPolicy, FailureKind};

/// Health record of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeHealth {
    pub failures: u32,
    pub last_failure: Option<Instant>,
    pub backoff_until: Option<Instant>,
}

impl NodeHealth {
    pub fn is_eligible(&self, now: Instant) -> bool {
        self.backoff_until.map_or(true, |until| now >= until)
    }
}

/// Serializable view of one record, for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub url: String,
    pub failures: u32,
    pub eligible: bool,
    /// Milliseconds left in the backoff window (0 when eligible).
    pub backoff_remaining_ms: u64,
}

/// Thread-safe table of [`NodeHealth`], one per registered endpoint.
pub struct HealthTracker {
    policy: BackoffPolicy,
    urls: Vec<String>,
    records: Mutex<Vec<NodeHealth>>,
}

impl HealthTracker {
    /// Create a zeroed record for every endpoint in `registry`.
    pub fn new(registry: &EndpointRegistry, policy: BackoffPolicy) -> Self {
        let urls: Vec<String> = registry.iter().map(|(_, e)| e.url.clone()).collect();
        Self {
            policy,
            records: Mutex::new(vec![NodeHealth::default(); urls.len()]),
            urls,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, Vec<NodeHealth>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current record.
    pub fn get(&self, id: EndpointId) -> NodeHealth {
        self.lock()[id.index()]
    }

    pub fn failures(&self, id: EndpointId) -> u32 {
        self.get(id).failures
    }

    /// Record a failed attempt now. Returns the backoff window applied.
    pub fn record_failure(&self, id: EndpointId, kind: FailureKind) -> Duration {
        self.record_failure_at(id, kind, Instant::now())
    }

    /// Record a failed attempt observed at `now`.
    pub fn record_failure_at(&self, id: EndpointId, kind: FailureKind, now: Instant) -> Duration {
        let mut records = self.lock();
        let health = &mut records[id.index()];
        health.failures = health.failures.saturating_add(1);
        health.last_failure = Some(now);
        let window = self.policy.window(kind, health.failures);
        health.backoff_until = Some(now + window);
        tracing::debug!(
            url = %self.urls[id.index()],
            %kind,
            failures = health.failures,
            backoff_ms = window.as_millis() as u64,
            "endpoint backed off"
        );
        window
    }

    /// Record a successful attempt.
    pub fn record_success(&self, id: EndpointId) {
        let mut records = self.lock();
        let health = &mut records[id.index()];
        health.failures = health.failures.saturating_sub(1);
    }

    pub fn is_eligible(&self, id: EndpointId, now: Instant) -> bool {
        self.lock()[id.index()].is_eligible(now)
    }

    /// Clear the record. Only used when every candidate is backed off.
    pub fn force_reset(&self, id: EndpointId) {
        let mut records = self.lock();
        let health = &mut records[id.index()];
        health.failures = 0;
        health.backoff_until = None;
        tracing::info!(url = %self.urls[id.index()], "endpoint health force-reset");
    }

    /// Keep the ids eligible at `now`, ordered by ascending failure count.
    ///
    /// The sort is stable: ties keep the order of `candidates`.
    pub fn rank(&self, candidates: &[EndpointId], now: Instant) -> Vec<EndpointId> {
        let records = self.lock();
        let mut eligible: Vec<(EndpointId, u32)> = candidates
            .iter()
            .map(|&id| (id, records[id.index()]))
            .filter(|(_, h)| h.is_eligible(now))
            .map(|(id, h)| (id, h.failures))
            .collect();
        eligible.sort_by_key(|&(_, failures)| failures);
        eligible.into_iter().map(|(id, _)| id).collect()
    }

    pub fn snapshot(&self, now: Instant) -> Vec<HealthSnapshot> {
        let records = self.lock();
        records
            .iter()
            .zip(&self.urls)
            .map(|(h, url)| HealthSnapshot {
                url: url.clone(),
                failures: h.failures,
                eligible: h.is_eligible(now),
                backoff_remaining_ms: h
                    .backoff_until
                    .map(|until| until.saturating_duration_since(now).as_millis() as u64)
                    .unwrap_or(0),
            })
            .collect()
    }
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker")
            .field("endpoints", &self.urls.len())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (EndpointRegistry, HealthTracker) {
        let reg = EndpointRegistry::new(
            "https://private.example",
            ["https://a.example", "https://b.example"],
        )
        .unwrap();
        let tracker = HealthTracker::new(&reg, BackoffPolicy::default());
        (reg, tracker)
    }

    #[test]
    fn starts_eligible_with_zero_failures() {
        let (reg, t) = tracker();
        let now = Instant::now();
        for (id, _) in reg.iter() {
            assert_eq!(t.failures(id), 0);
            assert!(t.is_eligible(id, now));
        }
    }

    #[test]
    fn rate_limit_window_uses_post_increment_count() {
        let (reg, t) = tracker();
        let id = reg.private();
        let now = Instant::now();
        assert_eq!(t.record_failure_at(id, FailureKind::RateLimit, now).as_secs(), 2);
        assert_eq!(t.record_failure_at(id, FailureKind::RateLimit, now).as_secs(), 4);
        let h = t.get(id);
        assert_eq!(h.failures, 2);
        assert_eq!(h.last_failure, Some(now));
        assert_eq!(h.backoff_until, Some(now + Duration::from_secs(4)));
    }

    #[test]
    fn backoff_excludes_until_window_passes() {
        let (reg, t) = tracker();
        let id = reg.private();
        let now = Instant::now();
        t.record_failure_at(id, FailureKind::Timeout, now);
        assert!(!t.is_eligible(id, now + Duration::from_millis(2_999)));
        assert!(t.is_eligible(id, now + Duration::from_millis(3_000)));
    }

    #[test]
    fn success_decrements_but_never_below_zero() {
        let (reg, t) = tracker();
        let id = reg.private();
        t.record_failure(id, FailureKind::ServerError);
        t.record_failure(id, FailureKind::ServerError);
        let before = t.get(id);
        t.record_success(id);
        assert_eq!(t.failures(id), 1);
        assert_eq!(t.get(id).backoff_until, before.backoff_until);
        t.record_success(id);
        t.record_success(id);
        assert_eq!(t.failures(id), 0);
    }

    #[test]
    fn force_reset_clears_record() {
        let (reg, t) = tracker();
        let id = reg.private();
        let now = Instant::now();
        t.record_failure_at(id, FailureKind::RateLimit, now);
        t.force_reset(id);
        assert_eq!(t.failures(id), 0);
        assert!(t.is_eligible(id, now));
    }

    #[test]
    fn rank_filters_backed_off_and_sorts_stably() {
        let (reg, t) = tracker();
        let ids: Vec<_> = reg.iter().map(|(id, _)| id).collect();
        let now = Instant::now();
        // #0 backed off, #1 has one old failure, #2 clean
        t.record_failure_at(ids[0], FailureKind::ServerError, now);
        t.record_failure_at(ids[1], FailureKind::ServerError, now - Duration::from_secs(10));
        assert_eq!(t.rank(&ids, now), vec![ids[2], ids[1]]);

        // equal counts keep candidate order
        t.record_success(ids[1]);
        assert_eq!(t.rank(&[ids[2], ids[1]], now), vec![ids[2], ids[1]]);
        assert_eq!(t.rank(&[ids[1], ids[2]], now), vec![ids[1], ids[2]]);
    }

    #[test]
    fn snapshot_reports_remaining_backoff() {
        let (reg, t) = tracker();
        let now = Instant::now();
        t.record_failure_at(reg.private(), FailureKind::ServerError, now);
        let snap = t.snapshot(now + Duration::from_millis(500));
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].failures, 1);
        assert!(!snap[0].eligible);
        assert_eq!(snap[0].backoff_remaining_ms, 1_500);
        assert!(snap[1].eligible);
    }
}

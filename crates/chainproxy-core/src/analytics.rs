//! Request analytics.
//!
//! Cumulative counters kept for diagnosing rate limiting and flaky nodes.
//! Nothing here feeds back into routing, and nothing is persisted.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::time::Instant;

use crate::endpoint::{EndpointId, EndpointRegistry};
use crate::policy::FailureKind;

/// Per-endpoint attempt counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub url: String,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub rate_limits: u64,
    pub server_errors: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    /// Non-429 4xx answers; counted in `failures` too.
    pub rejections: u64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Requests waiting in the queue or in flight.
    pub queued_requests: u64,
    pub method_counts: BTreeMap<String, u64>,
    pub endpoints: Vec<EndpointStats>,
    pub uptime_ms: u64,
}

#[derive(Default)]
struct Counters {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    queued_requests: u64,
    method_counts: BTreeMap<String, u64>,
    endpoints: Vec<EndpointStats>,
}

/// Thread-safe analytics recorder.
pub struct Analytics {
    started: Instant,
    counters: Mutex<Counters>,
}

impl Analytics {
    pub fn new(registry: &EndpointRegistry) -> Self {
        let endpoints = registry
            .iter()
            .map(|(_, e)| EndpointStats {
                url: e.url.clone(),
                ..Default::default()
            })
            .collect();
        Self {
            started: Instant::now(),
            counters: Mutex::new(Counters {
                endpoints,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// An inbound request entered the queue.
    pub fn request_received(&self) {
        let mut c = self.lock();
        c.total_requests += 1;
        c.queued_requests += 1;
    }

    /// An inbound request left the queue with the given outcome.
    pub fn request_settled(&self, ok: bool) {
        let mut c = self.lock();
        c.queued_requests = c.queued_requests.saturating_sub(1);
        if ok {
            c.successful_requests += 1;
        } else {
            c.failed_requests += 1;
        }
    }

    /// Counted once per dispatched call, not per attempt.
    pub fn record_method(&self, method: &str) {
        *self.lock().method_counts.entry(method.to_string()).or_insert(0) += 1;
    }

    pub fn record_attempt(&self, id: EndpointId) {
        self.lock().endpoints[id.index()].requests += 1;
    }

    pub fn record_success(&self, id: EndpointId) {
        self.lock().endpoints[id.index()].successes += 1;
    }

    pub fn record_failure(&self, id: EndpointId, kind: FailureKind) {
        let mut c = self.lock();
        let stats = &mut c.endpoints[id.index()];
        stats.failures += 1;
        match kind {
            FailureKind::RateLimit => stats.rate_limits += 1,
            FailureKind::ServerError => stats.server_errors += 1,
            FailureKind::Timeout => stats.timeouts += 1,
            FailureKind::Transport => stats.transport_errors += 1,
        }
    }

    pub fn record_rejection(&self, id: EndpointId) {
        let mut c = self.lock();
        let stats = &mut c.endpoints[id.index()];
        stats.failures += 1;
        stats.rejections += 1;
    }

    pub fn endpoint(&self, id: EndpointId) -> EndpointStats {
        self.lock().endpoints[id.index()].clone()
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        let c = self.lock();
        AnalyticsSnapshot {
            total_requests: c.total_requests,
            successful_requests: c.successful_requests,
            failed_requests: c.failed_requests,
            queued_requests: c.queued_requests,
            method_counts: c.method_counts.clone(),
            endpoints: c.endpoints.clone(),
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("total_requests", &self.lock().total_requests)
            .finish()
    }
}

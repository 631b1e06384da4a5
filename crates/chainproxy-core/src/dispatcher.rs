//! Health-aware failover dispatch of a single JSON-RPC call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::analytics::Analytics;
use crate::endpoint::{EndpointId, EndpointRegistry};
use crate::error::ProxyError;
use crate::health::HealthTracker;
use crate::policy::BackoffPolicy;
use crate::request::{RpcCall, RpcReply};
use crate::route::{RouteSelector, TrafficClass};
use crate::upstream::Upstream;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Timeout per individual attempt.
    pub request_timeout: Duration,
    /// Backoff windows applied after failed attempts.
    pub backoff: BackoffPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Sends a call to the best eligible endpoint, failing over on
/// rate limits, server errors, timeouts and transport errors.
///
/// Candidates come from the [`RouteSelector`], are filtered by backoff and
/// ordered by failure count. A non-429 4xx ends the call immediately.
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    routes: RouteSelector,
    health: Arc<HealthTracker>,
    analytics: Arc<Analytics>,
    upstream: Arc<dyn Upstream>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        registry: EndpointRegistry,
        upstream: Arc<dyn Upstream>,
        config: DispatcherConfig,
    ) -> Self {
        let routes = RouteSelector::new(&registry);
        let health = Arc::new(HealthTracker::new(&registry, config.backoff.clone()));
        let analytics = Arc::new(Analytics::new(&registry));
        Self {
            registry: Arc::new(registry),
            routes,
            health,
            analytics,
            upstream,
            config,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn routes(&self) -> &RouteSelector {
        &self.routes
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn analytics(&self) -> &Arc<Analytics> {
        &self.analytics
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Attempt order for `method` under `class` at `now`.
    ///
    /// Eligible candidates, fewest failures first. When every candidate is
    /// backed off, the first one is force-reset and used alone so the call
    /// still makes progress.
    pub fn plan(
        &self,
        method: &str,
        class: TrafficClass,
        now: Instant,
    ) -> Result<Vec<EndpointId>, ProxyError> {
        let candidates = self.routes.select(method, class);
        let first = *candidates.first().ok_or_else(|| ProxyError::NoCandidates {
            method: method.to_string(),
        })?;

        let ranked = self.health.rank(&candidates, now);
        if ranked.is_empty() {
            tracing::warn!(
                method,
                %class,
                url = %self.registry.get(first).url,
                "all candidates backed off, forcing first candidate"
            );
            self.health.force_reset(first);
            return Ok(vec![first]);
        }
        Ok(ranked)
    }

    /// Dispatch one call. Returns the first successful endpoint's reply,
    /// body untouched.
    pub async fn dispatch(&self, call: &RpcCall, class: TrafficClass) -> Result<RpcReply, ProxyError> {
        self.analytics.record_method(&call.method);
        let plan = self.plan(&call.method, class, Instant::now())?;

        let mut last = None;
        let mut attempts = 0usize;
        for id in plan {
            attempts += 1;
            self.analytics.record_attempt(id);
            match self.attempt(id, call).await {
                Ok(value) => {
                    self.health.record_success(id);
                    self.analytics.record_success(id);
                    return Ok(value);
                }
                Err(e) => match e.failure_kind() {
                    Some(kind) => {
                        let window = self.health.record_failure(id, kind);
                        self.analytics.record_failure(id, kind);
                        tracing::warn!(
                            url = %self.registry.get(id).url,
                            method = %call.method,
                            %kind,
                            backoff_ms = window.as_millis() as u64,
                            error = %e,
                            "endpoint attempt failed"
                        );
                        last = Some(e);
                    }
                    None => {
                        self.analytics.record_rejection(id);
                        tracing::warn!(
                            url = %self.registry.get(id).url,
                            method = %call.method,
                            error = %e,
                            "endpoint rejected request"
                        );
                        return Err(e);
                    }
                },
            }
        }

        let last = last.ok_or_else(|| ProxyError::NoCandidates {
            method: call.method.clone(),
        })?;
        tracing::error!(
            method = %call.method,
            %class,
            attempts,
            error = %last,
            "all endpoints unavailable"
        );
        Err(ProxyError::AllEndpointsUnavailable {
            attempts,
            last: Box::new(last),
        })
    }

    /// One POST against one endpoint, classified.
    async fn attempt(&self, id: EndpointId, call: &RpcCall) -> Result<RpcReply, ProxyError> {
        let url = &self.registry.get(id).url;
        let timeout = self.config.request_timeout;

        let reply = tokio::time::timeout(timeout, self.upstream.post(url, call.body.clone()))
            .await
            .map_err(|_| ProxyError::Timeout {
                url: url.clone(),
                ms: timeout.as_millis() as u64,
            })??;

        match reply.status {
            429 => Err(ProxyError::RateLimited { url: url.clone() }),
            status if status >= 500 => Err(ProxyError::ServerError {
                url: url.clone(),
                status,
            }),
            status if !reply.is_success() => Err(ProxyError::UpstreamRejected {
                url: url.clone(),
                status,
            }),
            _ => RpcReply::parse(reply.body).map_err(|e| ProxyError::Http {
                url: url.clone(),
                reason: format!("invalid JSON body: {e}"),
            }),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoints", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

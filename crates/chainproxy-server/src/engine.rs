//! The proxy engine: one dispatcher, one sequential queue, shared by every
//! HTTP handler.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use chainproxy_core::queue::settle;
use chainproxy_core::{
    AnalyticsSnapshot, Dispatcher, HealthSnapshot, ProxyError, RpcCall, RpcReply,
    SequentialQueue, TrafficClass, Upstream,
};

use crate::config::ProxyConfig;
use crate::error::ServerError;

/// Body of `GET /stats`.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    #[serde(flatten)]
    pub analytics: AnalyticsSnapshot,
    pub health: Vec<HealthSnapshot>,
    pub queue_depth: usize,
    pub processing: bool,
}

/// Owns all process-wide proxy state.
///
/// Must be created inside a Tokio runtime: the queue's drain task is
/// spawned on construction.
#[derive(Debug)]
pub struct ProxyEngine {
    dispatcher: Arc<Dispatcher>,
    queue: SequentialQueue,
}

impl ProxyEngine {
    pub fn new(dispatcher: Dispatcher) -> Arc<Self> {
        let dispatcher = Arc::new(dispatcher);
        let queue = SequentialQueue::spawn(dispatcher.clone());
        Arc::new(Self { dispatcher, queue })
    }

    pub fn from_config(
        config: &ProxyConfig,
        upstream: Arc<dyn Upstream>,
    ) -> Result<Arc<Self>, ServerError> {
        let dispatcher = Dispatcher::new(config.registry()?, upstream, config.dispatcher_config());
        Ok(Self::new(dispatcher))
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn queue(&self) -> &SequentialQueue {
        &self.queue
    }

    /// Queue a call and wait for its outcome.
    ///
    /// The call takes its queue slot on the first poll, before anything is
    /// awaited, so queue order follows arrival order. Settlement runs on
    /// its own task: a client that disconnects still has its request
    /// dispatched and counted.
    pub async fn call(&self, call: RpcCall, class: TrafficClass) -> Result<RpcReply, ProxyError> {
        let analytics = Arc::clone(self.dispatcher.analytics());
        analytics.request_received();
        let pending = match self.queue.enqueue(call, class) {
            Ok(pending) => pending,
            Err(e) => {
                analytics.request_settled(false);
                return Err(e);
            }
        };

        let task = tokio::spawn(async move {
            let result = settle(pending).await;
            analytics.request_settled(result.is_ok());
            result
        });
        task.await
            .map_err(|e| ProxyError::Other(format!("proxy task failed: {e}")))?
    }

    pub fn stats(&self) -> StatsReport {
        StatsReport {
            analytics: self.dispatcher.analytics().snapshot(),
            health: self.dispatcher.health().snapshot(Instant::now()),
            queue_depth: self.queue.depth(),
            processing: self.queue.is_processing(),
        }
    }

    /// Log a one-line summary every `every`.
    pub fn spawn_stats_logger(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = engine.stats();
                let backed_off = stats.health.iter().filter(|h| !h.eligible).count();
                tracing::info!(
                    total = stats.analytics.total_requests,
                    ok = stats.analytics.successful_requests,
                    failed = stats.analytics.failed_requests,
                    queued = stats.queue_depth,
                    backed_off,
                    "proxy stats"
                );
            }
        })
    }
}

//! Sequential request queue: one in-flight dispatch for the whole proxy.
//!
//! Callers submit `(call, class)` items into an unbounded channel. A single
//! background drain task pops them in arrival order, runs the
//! [`Dispatcher`] on each and settles the item's `oneshot` with the
//! outcome. Items are never dispatched concurrently and never delayed
//! between each other.
//!
//! # Usage
//! ```rust,no_run
//! use std::sync::Arc;
//! use chainproxy_core::{Dispatcher, SequentialQueue};
//!
//! # fn demo(dispatcher: Arc<Dispatcher>) {
//! let queue = SequentialQueue::spawn(dispatcher);
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::dispatcher::Dispatcher;
use crate::error::ProxyError;
use crate::request::{RpcCall, RpcReply};
use crate::route::TrafficClass;

type Completion = oneshot::Sender<Result<RpcReply, ProxyError>>;

/// Receiving side of a queued item's outcome.
pub type Pending = oneshot::Receiver<Result<RpcReply, ProxyError>>;

struct QueueItem {
    call: RpcCall,
    class: TrafficClass,
    tx: Completion,
}

#[derive(Default)]
struct QueueState {
    /// Items submitted and not yet settled (waiting + in flight).
    depth: AtomicUsize,
    /// `true` while the drain task is working through a run of items.
    processing: AtomicBool,
}

/// FIFO pipeline in front of the [`Dispatcher`].
pub struct SequentialQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
    state: Arc<QueueState>,
}

impl SequentialQueue {
    /// Spawn the drain task on the current Tokio runtime.
    pub fn spawn(dispatcher: Arc<Dispatcher>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<QueueItem>();
        let state = Arc::new(QueueState::default());

        let drain_state = state.clone();
        tokio::spawn(async move {
            drain_loop(rx, dispatcher, drain_state).await;
        });

        Self { tx, state }
    }

    /// Enqueue a call and wait for its own outcome.
    ///
    /// Dropping the returned future does not cancel the item: it is still
    /// dispatched in turn and its outcome discarded.
    pub async fn submit(&self, call: RpcCall, class: TrafficClass) -> Result<RpcReply, ProxyError> {
        settle(self.enqueue(call, class)?).await
    }

    /// Put a call at the back of the queue without waiting.
    ///
    /// The item's position is fixed when this returns, so calls enqueued
    /// one after another are dispatched in that order.
    pub fn enqueue(&self, call: RpcCall, class: TrafficClass) -> Result<Pending, ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.state.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(QueueItem { call, class, tx }).is_err() {
            self.state.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(ProxyError::QueueClosed);
        }
        Ok(rx)
    }

    /// Items waiting or in flight.
    pub fn depth(&self) -> usize {
        self.state.depth.load(Ordering::SeqCst)
    }

    pub fn is_processing(&self) -> bool {
        self.state.processing.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for SequentialQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialQueue")
            .field("depth", &self.depth())
            .field("processing", &self.is_processing())
            .finish()
    }
}

/// Wait for a queued item's outcome.
pub async fn settle(pending: Pending) -> Result<RpcReply, ProxyError> {
    pending.await.map_err(|_| ProxyError::QueueClosed)?
}

async fn drain_loop(
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<QueueState>,
) {
    // Wait for the first item of a run, then drain until empty
    while let Some(first) = rx.recv().await {
        state.processing.store(true, Ordering::SeqCst);

        let mut next = Some(first);
        while let Some(item) = next {
            let result = dispatcher.dispatch(&item.call, item.class).await;
            state.depth.fetch_sub(1, Ordering::SeqCst);
            if item.tx.send(result).is_err() {
                tracing::debug!(method = %item.call.method, "caller gone before settlement");
            }
            next = rx.try_recv().ok();
        }

        state.processing.store(false, Ordering::SeqCst);
    }
    tracing::debug!("request queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::mock::{ScriptedUpstream, Step, OK_BODY};
    use crate::dispatcher::DispatcherConfig;
    use crate::endpoint::EndpointRegistry;
    use crate::upstream::{Upstream, UpstreamReply};

    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::future::join_all;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    const PRIVATE: &str = "https://private.example";
    const A: &str = "https://a.example";

    fn call(method: &str, id: u64) -> RpcCall {
        RpcCall::from_body(format!(
            r#"{{"jsonrpc":"2.0","method":"{method}","params":[],"id":{id}}}"#
        ))
    }

    fn queue(upstream: Arc<dyn Upstream>) -> SequentialQueue {
        let registry = EndpointRegistry::new(PRIVATE, [A]).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(registry, upstream, DispatcherConfig::default()));
        SequentialQueue::spawn(dispatcher)
    }

    /// Records start/end of every post and how many overlap.
    #[derive(Default)]
    struct Timeline {
        events: Mutex<Vec<(String, Instant)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl Upstream for Timeline {
        async fn post(&self, _url: &str, body: Bytes) -> Result<UpstreamReply, ProxyError> {
            let call = RpcCall::from_body(body);
            let id = call.id.unwrap_or_default().to_string();
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
            self.events.lock().unwrap().push((format!("start {id}"), Instant::now()));

            if id == "1" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }

            self.events.lock().unwrap().push((format!("end {id}"), Instant::now()));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(UpstreamReply::new(
                200,
                format!(r#"{{"jsonrpc":"2.0","id":{id},"result":"0x{id}"}}"#),
            ))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_waits_for_first() {
        let timeline = Arc::new(Timeline::default());
        let q = queue(timeline.clone());

        let (first, second) = tokio::join!(
            q.submit(call("eth_call", 1), TrafficClass::User),
            q.submit(call("eth_call", 2), TrafficClass::User),
        );
        assert_eq!(first.unwrap().value["result"], "0x1");
        assert_eq!(second.unwrap().value["result"], "0x2");

        let events = timeline.events.lock().unwrap().clone();
        let labels: Vec<&str> = events.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["start 1", "end 1", "start 2", "end 2"]);
        assert!(events[2].1 >= events[1].1);
        assert_eq!(timeline.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn every_item_settled_exactly_once() {
        let timeline = Arc::new(Timeline::default());
        let q = queue(timeline.clone());

        let results = join_all((10..60).map(|i| q.submit(call("eth_getBalance", i), TrafficClass::User))).await;
        for (i, r) in (10..60).zip(results) {
            assert_eq!(r.unwrap().value["id"], i);
        }
        assert_eq!(q.depth(), 0);
        assert_eq!(timeline.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(timeline.events.lock().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn enqueue_order_is_dispatch_order() {
        let timeline = Arc::new(Timeline::default());
        let q = queue(timeline.clone());

        let pending: Vec<Pending> = (2..6)
            .map(|i| q.enqueue(call("eth_call", i), TrafficClass::User).unwrap())
            .collect();
        assert_eq!(q.depth(), 4);
        for (i, p) in (2..6).zip(pending) {
            assert_eq!(settle(p).await.unwrap().value["id"], i);
        }

        let starts: Vec<String> = timeline
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| l.starts_with("start"))
            .map(|(l, _)| l.clone())
            .collect();
        assert_eq!(starts, vec!["start 2", "start 3", "start 4", "start 5"]);
    }

    #[tokio::test]
    async fn failure_settles_only_its_item() {
        let up = Arc::new(ScriptedUpstream::new());
        up.script(A, [Step::Reply(400, "")]);
        let q = queue(up.clone());

        let (bad, good) = tokio::join!(
            q.submit(call("eth_call", 1), TrafficClass::User),
            q.submit(call("eth_call", 2), TrafficClass::User),
        );
        assert!(matches!(bad, Err(ProxyError::UpstreamRejected { .. })));
        assert_eq!(&good.unwrap().body[..], OK_BODY.as_bytes());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_caller_does_not_stall_queue() {
        let up = Arc::new(ScriptedUpstream::new());
        up.script(A, [Step::Slow(Duration::from_secs(2), OK_BODY)]);
        let q = queue(up.clone());

        let abandoned = q.submit(call("eth_call", 1), TrafficClass::User);
        let _ = tokio::time::timeout(Duration::from_millis(10), abandoned).await;

        let next = q.submit(call("eth_call", 2), TrafficClass::User).await;
        assert!(next.is_ok());
        assert_eq!(up.calls().len(), 2);
        assert_eq!(q.depth(), 0);
    }
}

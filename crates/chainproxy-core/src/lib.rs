//! chainproxy-core — routing, health and dispatch engine for ChainProxy.
//!
//! # Overview
//!
//! ChainProxy fronts a set of blockchain JSON-RPC endpoints with a single
//! HTTP entry point and hides rate limiting, server errors and slow nodes
//! from the caller. The core crate defines:
//!
//! - [`EndpointRegistry`]: the ordered, immutable list of upstream endpoints
//! - [`HealthTracker`]: per-endpoint failure counter and backoff window
//! - [`RouteSelector`]: candidate order per method and [`TrafficClass`]
//! - [`Dispatcher`]: one call with timeout, classification and failover
//! - [`SequentialQueue`]: FIFO pipeline with at most one in-flight dispatch
//! - [`Analytics`]: side-channel counters, never consulted for routing
//! - [`Upstream`]: the async seam the HTTP transport implements

pub mod analytics;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod policy;
pub mod queue;
pub mod request;
pub mod route;
pub mod upstream;

pub use analytics::{Analytics, AnalyticsSnapshot, EndpointStats};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use endpoint::{Endpoint, EndpointId, EndpointRegistry, EndpointRole};
pub use error::ProxyError;
pub use health::{HealthSnapshot, HealthTracker, NodeHealth};
pub use policy::{BackoffPolicy, FailureKind};
pub use queue::{Pending, SequentialQueue};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcCall, RpcReply};
pub use route::{RouteSelector, TrafficClass, WALLET_METHODS};
pub use upstream::{Upstream, UpstreamReply};

//! # chainproxy-server
//!
//! HTTP boundary of ChainProxy.
//!
//! ## Routes
//! - `POST /rpc?type=market|user`: proxied JSON-RPC call
//! - `OPTIONS /rpc`: CORS preflight, empty 200
//! - `GET /stats`: analytics counters and health table
//!
//! Every response carries the permissive CORS headers wallets expect.
//!
//! ## Wiring
//! [`ProxyConfig`] → [`ProxyEngine`] (dispatcher + sequential queue) →
//! [`router`] → [`serve`].

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod telemetry;

pub use config::ProxyConfig;
pub use engine::{ProxyEngine, StatsReport};
pub use error::ServerError;
pub use http::{router, serve};
pub use telemetry::{init_tracing, LogConfig};

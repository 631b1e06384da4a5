//! chainproxy-http — HTTP transport for ChainProxy upstream endpoints.
//!
//! Provides [`HttpUpstream`], the `reqwest` implementation of
//! [`chainproxy_core::Upstream`].

pub mod upstream;

pub use upstream::{HttpUpstream, HttpUpstreamConfig};

//! `chainproxy check`: query every configured endpoint once.
//!
//! Sends `eth_blockNumber` directly (no queue, no failover) and prints the
//! HTTP status, block number and latency per endpoint.

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chainproxy_core::{JsonRpcRequest, JsonRpcResponse, RpcCall, Upstream};
use chainproxy_http::HttpUpstream;
use chainproxy_server::ProxyConfig;

pub async fn run(config: &ProxyConfig) -> Result<()> {
    let registry = config.registry()?;
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::with_defaults()?);
    let timeout = Duration::from_millis(config.request_timeout_ms);
    let call = RpcCall::from_request(&JsonRpcRequest::new(1, "eth_blockNumber", vec![]))?;

    println!("Checking {} endpoint(s)...\n", registry.len());

    let mut failed = 0usize;
    for (id, endpoint) in registry.iter() {
        println!("  {id} {}", endpoint.url);
        let start = Instant::now();
        let outcome = tokio::time::timeout(timeout, upstream.post(&endpoint.url, call.body.clone())).await;
        let latency = start.elapsed();

        match outcome {
            Err(_) => {
                failed += 1;
                println!("     Status:  timed out after {}ms", timeout.as_millis());
            }
            Ok(Err(e)) => {
                failed += 1;
                println!("     Status:  error ({e})");
            }
            Ok(Ok(reply)) if !reply.is_success() => {
                failed += 1;
                println!("     Status:  HTTP {}", reply.status);
            }
            Ok(Ok(reply)) => match block_number(&reply.body) {
                Some(block) => {
                    println!("     Status:  OK");
                    println!("     Block:   {block}");
                    println!("     Latency: {}ms", latency.as_millis());
                }
                None => {
                    failed += 1;
                    println!("     Status:  unexpected body");
                }
            },
        }
    }

    println!();
    if failed > 0 {
        anyhow::bail!("{failed} of {} endpoint(s) failed", registry.len());
    }
    println!("All endpoints healthy");
    Ok(())
}

fn block_number(body: &[u8]) -> Option<u64> {
    let resp: JsonRpcResponse = serde_json::from_slice(body).ok()?;
    let hex = resp.into_result().ok()?;
    u64::from_str_radix(hex.as_str()?.trim_start_matches("0x"), 16).ok()
}

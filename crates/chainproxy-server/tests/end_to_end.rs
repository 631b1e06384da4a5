//! End-to-end proxy tests
//!
//! A real proxy listener in front of axum mock endpoints, driven by a
//! reqwest client.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use chainproxy_core::Upstream;
use chainproxy_http::HttpUpstream;
use chainproxy_server::{http::serve_on, ProxyConfig, ProxyEngine};
use futures::future::join_all;
use serde_json::{json, Value};
use tokio::net::TcpListener;

// ============================================================================
// Mock endpoint
// ============================================================================

struct MockState {
    name: &'static str,
    /// Status for the next request; 200 once taken.
    status: Mutex<Option<u16>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    hits: AtomicUsize,
}

async fn mock_handler(State(state): State<Arc<MockState>>, body: Bytes) -> (StatusCode, String) {
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);
    state.hits.fetch_add(1, Ordering::SeqCst);

    tokio::time::sleep(state.delay).await;

    let status = state.status.lock().unwrap().take().unwrap_or(200);
    let req: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    (
        StatusCode::from_u16(status).unwrap(),
        json!({"jsonrpc": "2.0", "id": req["id"], "result": state.name}).to_string(),
    )
}

async fn start_mock(name: &'static str, status: Option<u16>, delay: Duration) -> (String, Arc<MockState>) {
    let state = Arc::new(MockState {
        name,
        status: Mutex::new(status),
        delay,
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
        hits: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route("/", post(mock_handler))
        .with_state(state.clone());
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), state)
}

async fn start_proxy(private_url: String, public_urls: Vec<String>) -> String {
    let config = ProxyConfig {
        private_url,
        public_urls,
        ..ProxyConfig::default()
    };
    config.validate().unwrap();
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::with_defaults().unwrap());
    let engine = ProxyEngine::from_config(&config, upstream).unwrap();

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        serve_on(listener, engine).await.unwrap();
    });
    format!("http://{addr}")
}

fn body(method: &str, id: u64) -> String {
    json!({"jsonrpc": "2.0", "method": method, "params": [], "id": id}).to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn market_call_fails_over_and_shows_in_stats() {
    let (private_url, private) = start_mock("private", Some(429), Duration::ZERO).await;
    let (public_url, public) = start_mock("public", None, Duration::ZERO).await;
    let proxy = start_proxy(private_url, vec![public_url]).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{proxy}/rpc?type=market"))
        .header("content-type", "application/json")
        .body(body("eth_call", 5))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["access-control-allow-origin"].to_str().unwrap(),
        "*"
    );
    let value: Value = resp.json().await.unwrap();
    assert_eq!(value, json!({"jsonrpc": "2.0", "id": 5, "result": "public"}));
    assert_eq!(private.hits.load(Ordering::SeqCst), 1);
    assert_eq!(public.hits.load(Ordering::SeqCst), 1);

    let stats: Value = client
        .get(format!("{proxy}/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_requests"], 1);
    assert_eq!(stats["endpoints"][0]["rate_limits"], 1);
    assert_eq!(stats["health"][0]["failures"], 1);
    assert_eq!(stats["health"][0]["eligible"], false);
    assert_eq!(stats["health"][1]["failures"], 0);
}

#[tokio::test]
async fn concurrent_clients_are_served_one_at_a_time() {
    let (private_url, _) = start_mock("private", None, Duration::ZERO).await;
    let (public_url, public) = start_mock("public", None, Duration::from_millis(150)).await;
    let proxy = start_proxy(private_url, vec![public_url]).await;
    let client = reqwest::Client::new();

    let calls = (0..4u64).map(|id| {
        let client = client.clone();
        let url = format!("{proxy}/rpc");
        async move {
            let resp = client.post(url).body(body("eth_blockNumber", id)).send().await.unwrap();
            assert_eq!(resp.status(), 200);
            resp.json::<Value>().await.unwrap()
        }
    });
    let replies = join_all(calls).await;

    for (id, reply) in replies.iter().enumerate() {
        assert_eq!(reply["id"], id as u64);
    }
    assert_eq!(public.hits.load(Ordering::SeqCst), 4);
    assert_eq!(public.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_endpoint_down_is_502_with_envelope() {
    let (private_url, _) = start_mock("private", Some(500), Duration::ZERO).await;
    let (public_url, _) = start_mock("public", Some(503), Duration::ZERO).await;
    let proxy = start_proxy(private_url, vec![public_url]).await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy}/rpc?type=market"))
        .body(body("eth_call", 77))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
    let value: Value = resp.json().await.unwrap();
    assert_eq!(value["id"], 77);
    assert_eq!(value["error"]["code"], -32603);
}

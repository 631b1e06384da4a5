//! axum router for the proxy.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use chainproxy_core::{JsonRpcResponse, RpcCall, TrafficClass, Upstream};
use chainproxy_http::HttpUpstream;

use crate::config::ProxyConfig;
use crate::engine::ProxyEngine;
use crate::error::ServerError;

const ALLOW_METHODS: &str = "GET,OPTIONS,PATCH,DELETE,POST,PUT";
const ALLOW_HEADERS: &str = "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, \
                             Content-Length, Content-MD5, Content-Type, Date, X-Api-Version";

#[derive(Debug, Default, Deserialize)]
pub struct RpcQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Build the proxy router. CORS headers are set on every response.
pub fn router(engine: Arc<ProxyEngine>) -> Router {
    Router::new()
        .route("/rpc", any(handle_rpc))
        .route("/stats", get(handle_stats))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
        .with_state(engine)
}

async fn handle_rpc(
    State(engine): State<Arc<ProxyEngine>>,
    method: Method,
    query: Option<Query<RpcQuery>>,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    if method != Method::POST {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({ "error": "Method not allowed" })),
        )
            .into_response();
    }

    let class = TrafficClass::from_query(query.as_ref().and_then(|q| q.kind.as_deref()));
    let call = RpcCall::from_body(body);
    let id = call.id.clone();
    let rpc_method = call.method.clone();

    match engine.call(call, class).await {
        Ok(reply) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            reply.body,
        )
            .into_response(),
        Err(err) => {
            if err.is_timeout() {
                tracing::warn!(method = %rpc_method, %class, error = %err, "proxy call timed out");
            } else {
                tracing::error!(method = %rpc_method, %class, error = %err, "proxy call failed");
            }
            (StatusCode::BAD_GATEWAY, Json(JsonRpcResponse::unavailable(id))).into_response()
        }
    }
}

async fn handle_stats(State(engine): State<Arc<ProxyEngine>>) -> Response {
    Json(engine.stats()).into_response()
}

/// Build everything from `config` and serve until Ctrl-C.
pub async fn serve(config: ProxyConfig) -> Result<(), ServerError> {
    config.validate()?;
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::with_defaults()?);
    let engine = ProxyEngine::from_config(&config, upstream)?;
    if let Some(secs) = config.stats_log_interval_secs {
        engine.spawn_stats_logger(Duration::from_secs(secs));
    }

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        private = %config.private_url,
        public = config.public_urls.len(),
        "chainproxy listening"
    );
    serve_on(listener, engine).await
}

/// Serve `engine` on an already bound listener until Ctrl-C.
pub async fn serve_on(listener: TcpListener, engine: Arc<ProxyEngine>) -> Result<(), ServerError> {
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("chainproxy stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

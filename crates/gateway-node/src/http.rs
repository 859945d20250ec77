use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use gateway_core::waterfall::to_legacy;
use gateway_core::GatewayCore;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::sink::AxumClientSink;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<GatewayCore>,
}

/// Builds the full router: the WebSocket upgrade, the read-only JSON API,
/// and the gateway's own self-observability metrics. This module performs
/// no fusion logic of its own, only routing, (de)serialization, and
/// registry bookkeeping.
pub fn router(core: Arc<GatewayCore>) -> Router {
    let state = AppState { core };
    Router::new()
        .route("/websocket", get(websocket_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/metrics", get(metrics_handler))
        .route("/api/v1/waterfall", get(waterfall_legacy_handler))
        .route("/api/v1/waterfall/v2", get(waterfall_v2_handler))
        .route("/api/v1/consensus", get(consensus_handler))
        .route("/api/v1/event-rings", get(event_rings_handler))
        .route("/api/v1/internal-metrics", get(internal_metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": now_unix(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.core.store.current() {
        Some(snapshot) => Json(json!(snapshot)),
        None => Json(json!({ "status": "warming_up" })),
    }
}

async fn waterfall_legacy_handler(State(state): State<AppState>) -> impl IntoResponse {
    let graph = state.core.generate_waterfall(None, None);
    Json(json!(to_legacy(&graph, now_unix())))
}

async fn waterfall_v2_handler(State(state): State<AppState>) -> impl IntoResponse {
    let graph = state.core.generate_waterfall(None, None);
    Json(json!(graph))
}

async fn consensus_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.core.consensus.consensus_state()))
}

async fn event_rings_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!(state.core.subscriber.event_ring_status()))
}

async fn internal_metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = state.core.gateway_registry.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    ([("content-type", "text/plain; version=0.0.4")], buffer)
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.protocols(["compress-zstd"]).on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, state: AppState) {
    let (client_id, logs_rx) = state.core.register_client().await;
    info!(client_id, "client connected");

    let sink = AxumClientSink::new(socket);
    let ctx = state.core.broadcast_context();
    gateway_core::broadcast::run_client(sink, client_id, ctx, logs_rx).await;

    state.core.deregister_client(client_id).await;
    info!(client_id, "client disconnected");
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use gateway_config::GatewayConfig;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    fn test_core() -> Arc<GatewayCore> {
        std::env::remove_var("PROMETHEUS_ENDPOINT");
        std::env::remove_var("MONAD_IPC_PATH");
        std::env::remove_var("MONAD_WS_URL");
        std::env::remove_var("GATEWAY_BIND_ADDR");
        Arc::new(GatewayCore::new(GatewayConfig::from_env().unwrap()))
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok_before_any_snapshot() {
        let app = router(test_core());
        let response = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn metrics_endpoint_reports_warming_up_with_no_snapshot() {
        let app = router(test_core());
        let response = app
            .oneshot(Request::builder().uri("/api/v1/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "warming_up");
    }

    #[tokio::test]
    async fn internal_metrics_endpoint_exposes_prometheus_text_format() {
        let app = router(test_core());
        let response = app
            .oneshot(Request::builder().uri("/api/v1/internal-metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("gateway_"));
    }

    #[tokio::test]
    async fn consensus_endpoint_reports_empty_summary_before_any_block() {
        let app = router(test_core());
        let response = app
            .oneshot(Request::builder().uri("/api/v1/consensus").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["current_block"], 0);
    }
}

// SPDX-FileCopyrightText: 2026 Taskbell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of `taskbell serve`.
//!
//! - `GET /health`: JSON health rollup (503 unless operational)
//! - `GET /metrics`: Prometheus text exposition
//! - `POST /v1/tasks`: publishes a task notification to the relay exchange

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use taskbell_core::NotificationError;
use taskbell_prometheus::PrometheusExporter;
use taskbell_relay::{TaskNotification, TaskRelay};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pipeline::{Pipeline, is_healthy};

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub relay: Option<Arc<TaskRelay>>,
    pub exporter: Option<PrometheusExporter>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/metrics", get(get_metrics))
        .route("/v1/tasks", post(post_task))
        .with_state(state)
}

/// Binds `addr` and serves until `cancel` fires.
pub async fn serve(addr: &str, state: AppState, cancel: CancellationToken) -> Result<(), NotificationError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| NotificationError::InvalidConfig(format!("failed to bind {addr}: {e}")))?;
    info!(addr, "http server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| NotificationError::Internal(format!("http server error: {e}")))
}

async fn get_health(State(state): State<AppState>) -> Response {
    let health = state.pipeline.health().await;
    let status = if is_healthy(&health) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    match &state.exporter {
        Some(exporter) => exporter.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics are disabled\n").into_response(),
    }
}

async fn post_task(State(state): State<AppState>, body: Bytes) -> Response {
    let Some(relay) = &state.relay else {
        return (StatusCode::SERVICE_UNAVAILABLE, "relay is disabled\n").into_response();
    };
    let notification = match TaskNotification::from_slice(&body) {
        Ok(notification) => notification,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response(),
    };
    match relay.publish(&notification).await {
        Ok(message_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "message_id": message_id,
                "routing_key": notification.routing_key(),
            })),
        )
            .into_response(),
        Err(e) => {
            warn!(task_id = %notification.task_id, error = %e, "task publish failed");
            (StatusCode::BAD_GATEWAY, format!("{e}\n")).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use taskbell_config::{DispatchConfig, RelayConfig};
    use taskbell_dispatch::ChannelHandler;
    use taskbell_relay::InMemoryBroker;
    use tower::ServiceExt;

    async fn state(with_relay: bool) -> (AppState, InMemoryBroker) {
        let handler = Arc::new(ChannelHandler::from_config("test", &DispatchConfig::default()));
        let pipeline = Arc::new(Pipeline::Handler(Arc::clone(&handler)));
        let broker = InMemoryBroker::new();
        let relay = if with_relay {
            let relay = TaskRelay::new(
                Arc::new(broker.clone()),
                pipeline.sink(),
                RelayConfig::default(),
            );
            relay.setup().await.unwrap();
            Some(Arc::new(relay))
        } else {
            None
        };
        let state = AppState {
            pipeline,
            relay,
            exporter: None,
        };
        (state, broker)
    }

    #[tokio::test]
    async fn health_reports_rollup_as_json() {
        let (state, _) = state(false).await;
        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["provider_id"], "test");
        assert_eq!(json["status"], "operational");
    }

    #[tokio::test]
    async fn metrics_without_exporter_is_not_found() {
        let (state, _) = state(false).await;
        let response = router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn posted_task_lands_in_relay_queue() {
        let (state, broker) = state(true).await;
        let body = serde_json::json!({
            "type": "task.created",
            "taskId": "t1",
            "taskTitle": "Test",
            "action": "created",
            "channelId": "c1",
            "guildId": "g1"
        });
        let response = router(state)
            .oneshot(
                Request::post("/v1/tasks")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["routing_key"], "task.created");
        assert_eq!(broker.queue_depth("task-notifications"), 1);
    }

    #[tokio::test]
    async fn malformed_task_is_rejected() {
        let (state, broker) = state(true).await;
        let response = router(state)
            .oneshot(Request::post("/v1/tasks").body(Body::from("{nope")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(broker.queue_depth("task-notifications"), 0);
    }

    #[tokio::test]
    async fn task_post_without_relay_is_unavailable() {
        let (state, _) = state(false).await;
        let response = router(state)
            .oneshot(Request::post("/v1/tasks").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}

use std::{collections::HashMap, sync::Arc};

use anyhow::{Error, Result};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    clients::webhook::WebhookChannel,
    models::{
        circuit_breaker::CircuitState,
        health::{ComponentHealth, HealthCheckResponse, HealthStatus},
        notification::NotificationRequest,
        response::{ApiResponse, ControlResponse, EnqueueResponse},
    },
    queue::QueueService,
};

pub struct AppState {
    pub service: Arc<QueueService>,
    pub webhook: Option<Arc<WebhookChannel>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/notifications", post(enqueue_notification))
        .route(
            "/notifications/{id}",
            get(locate_notification).delete(remove_notification),
        )
        .route("/queue", delete(clear_queue))
        .route("/queue/pause", post(pause_queue))
        .route("/queue/resume", post(resume_queue))
        .route("/dead-letters", get(dead_letters))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(state: Arc<AppState>, port: u16) -> Result<(), Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let manager = state.service.manager();
    let mut checks = HashMap::new();

    let queue_health = if state.service.is_paused() {
        ComponentHealth::degraded("Batch dispatch paused")
    } else {
        ComponentHealth::healthy()
    };
    checks.insert("queue".to_string(), queue_health);

    let connectivity_health = if manager.is_online() {
        ComponentHealth::healthy()
    } else {
        ComponentHealth::unhealthy("Offline")
    };
    checks.insert("connectivity".to_string(), connectivity_health);

    if let Some(webhook) = &state.webhook {
        let circuit = webhook.circuit_state();
        let channel_health = match circuit {
            CircuitState::Closed => ComponentHealth::healthy(),
            CircuitState::HalfOpen => ComponentHealth::degraded("Recovering"),
            CircuitState::Open => ComponentHealth::degraded("Circuit open"),
        };
        checks.insert(
            "delivery_channel".to_string(),
            channel_health.with_circuit_breaker(circuit.to_string()),
        );
    }

    let health = HealthCheckResponse::from_checks(checks);

    let status_code = match health.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.service.manager().stats();
    Json(ApiResponse::success(stats, "Queue statistics"))
}

async fn enqueue_notification(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotificationRequest>,
) -> impl IntoResponse {
    match state.service.manager().enqueue(request) {
        Ok(true) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(
                EnqueueResponse { queued: true },
                "Notification queued",
            )),
        ),
        Ok(false) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                EnqueueResponse { queued: false },
                "Duplicate notification ignored",
            )),
        ),
        Err(e) => {
            warn!(error = %e, "Rejected malformed notification");
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(e.to_string(), "Invalid notification")),
            )
        }
    }
}

async fn locate_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.service.manager().locate(&id) {
        Some(status) => (
            StatusCode::OK,
            Json(ApiResponse::success(status, "Notification found")),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(
                format!("No pending notification with id {}", id),
                "Not found",
            )),
        ),
    }
}

async fn remove_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    if state.service.manager().remove(&id) {
        (
            StatusCode::OK,
            Json(ApiResponse::success(id, "Notification removed")),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(
                format!("No pending notification with id {}", id),
                "Not found",
            )),
        )
    }
}

async fn clear_queue(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.service.manager().clear();
    Json(ApiResponse::success((), "Queue cleared"))
}

async fn pause_queue(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let changed = state.service.pause();
    Json(ApiResponse::success(
        ControlResponse {
            changed,
            paused: true,
        },
        "Batch dispatch paused",
    ))
}

async fn resume_queue(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let changed = state.service.resume();
    Json(ApiResponse::success(
        ControlResponse {
            changed,
            paused: state.service.is_paused(),
        },
        "Batch dispatch resumed",
    ))
}

async fn dead_letters(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let entries = state.service.manager().dead_letters();
    Json(ApiResponse::success(entries, "Dead letters"))
}

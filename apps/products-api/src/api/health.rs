//! Readiness and metrics endpoints

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use axum_helpers::{HealthCheckFuture, run_health_checks};
use database::{postgres, redis};
use serde_json::Value;

use crate::state::AppState;

/// 200 when Postgres and Redis both answer, 503 otherwise.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db = state.db.clone();
    let mut conn = state.redis.clone();

    let checks: Vec<(&str, HealthCheckFuture)> = vec![
        (
            "postgres",
            Box::pin(async move { postgres::check_health(&db).await.map_err(|e| e.to_string()) }),
        ),
        (
            "redis",
            Box::pin(async move { redis::check_health(&mut conn).await.map_err(|e| e.to_string()) }),
        ),
    ];

    match run_health_checks(checks).await {
        Ok(response) | Err(response) => response,
    }
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        stream_worker::render_metrics(),
    )
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .with_state(state)
}

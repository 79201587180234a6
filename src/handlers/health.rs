use super::AppState;
use crate::models::HealthStatus;
use axum::{extract::State, Json};
use chrono::Utc;

pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    let (store, redis_ok) = match &state.redis {
        Some(redis) => ("redis", redis.ping().await),
        None => ("memory", false),
    };

    let status = if state.redis.is_none() || redis_ok {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store: store.to_string(),
        redis: redis_ok,
        provider: state.payments.orchestrator().provider_name().to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}

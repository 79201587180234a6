pub mod challenge;
pub mod health;
pub mod payment;

pub use challenge::*;
pub use health::*;
pub use payment::*;

use crate::{services::PaymentService, storage::RedisStore};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    /// `None` when running on the in-memory store.
    pub redis: Option<Arc<RedisStore>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(payments: Arc<PaymentService>, redis: Option<Arc<RedisStore>>) -> Self {
        Self {
            payments,
            redis,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/challenges", post(create_challenge))
        .route(VERIFY_ENDPOINT, post(verify_payment))
        .with_state(state)
}

//! Persistence seams for the payment core.
//!
//! Backends own uniqueness. [`ConfirmationRepository::insert`] must fail with
//! [`StoreError::UniqueViolation`] when either unique key is already taken,
//! atomically with the write; callers never check before inserting.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuditEvent, PaymentChallenge, PaymentConfirmation};

pub use self::memory::{MemoryAuditSink, MemoryStore};
pub use self::redis::{RedisAuditSink, RedisStore};

/// The unique keys of the confirmation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    ChallengeId,
    TxHash,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unique constraint violated on {0:?}")]
    UniqueViolation(UniqueKey),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait ConfirmationRepository: Send + Sync {
    async fn insert(&self, confirmation: &PaymentConfirmation) -> Result<(), StoreError>;

    async fn find_by_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<PaymentConfirmation>, StoreError>;

    async fn find_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<PaymentConfirmation>, StoreError>;
}

#[async_trait]
pub trait ChallengeRepository: Send + Sync {
    async fn save_challenge(&self, challenge: &PaymentChallenge) -> Result<(), StoreError>;

    async fn find_challenge(&self, nonce: Uuid) -> Result<Option<PaymentChallenge>, StoreError>;
}

/// Append-only destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError>;
}

/// The repositories the service runs on, picked at startup.
#[derive(Clone)]
pub struct Storage {
    pub confirmations: Arc<dyn ConfirmationRepository>,
    pub challenges: Arc<dyn ChallengeRepository>,
    pub audit: Arc<dyn AuditSink>,
    /// Set when the repositories live in Redis.
    pub redis: Option<Arc<RedisStore>>,
}

impl Storage {
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            confirmations: store.clone(),
            challenges: store,
            audit: Arc::new(MemoryAuditSink::new()),
            redis: None,
        }
    }

    pub fn redis(store: RedisStore) -> Self {
        let store = Arc::new(store);
        Self {
            confirmations: store.clone(),
            challenges: store.clone(),
            audit: Arc::new(store.audit_sink()),
            redis: Some(store),
        }
    }

    /// Connects to Redis when a URL is configured, otherwise (or when the
    /// connection fails) runs on process memory.
    pub async fn open(redis_url: Option<&str>) -> Self {
        let Some(url) = redis_url else {
            tracing::warn!("REDIS_URL not set, confirmations are kept in memory only");
            return Self::memory();
        };

        match RedisStore::connect(url).await {
            Ok(store) => Self::redis(store),
            Err(e) => {
                tracing::warn!("Redis unavailable, using in-memory store: {}", e);
                Self::memory()
            }
        }
    }
}

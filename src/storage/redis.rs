use async_trait::async_trait;
use moka::future::Cache;
use redis::AsyncCommands;
use std::time::Duration;
use uuid::Uuid;

use super::{AuditSink, ChallengeRepository, ConfirmationRepository, StoreError, UniqueKey};
use crate::models::{AuditEvent, PaymentChallenge, PaymentConfirmation};

const KEY_PREFIX: &str = "x402";

fn confirmation_by_challenge_key(challenge_id: Uuid) -> String {
    format!("{}:confirmation:challenge:{}", KEY_PREFIX, challenge_id)
}

fn confirmation_by_tx_key(tx_hash: &str) -> String {
    format!("{}:confirmation:tx:{}", KEY_PREFIX, tx_hash)
}

fn challenge_key(nonce: Uuid) -> String {
    format!("{}:challenge:{}", KEY_PREFIX, nonce)
}

fn audit_track_key(track_id: &str) -> String {
    format!("{}:audit:track:{}", KEY_PREFIX, track_id)
}

fn audit_log_key() -> String {
    format!("{}:audit:log", KEY_PREFIX)
}

/// Redis-backed confirmation and challenge storage.
///
/// A confirmation is written under two keys, one per unique column, with a
/// single `MSETNX`: either both keys are created or neither is. Rows never
/// change after insert, so reads by challenge id are served from a local
/// cache once seen.
pub struct RedisStore {
    redis: redis::aio::ConnectionManager,
    confirmed: Cache<Uuid, PaymentConfirmation>,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let redis = client.get_connection_manager().await?;
        tracing::info!("Redis connected successfully");

        let confirmed = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Ok(Self { redis, confirmed })
    }

    pub fn audit_sink(&self) -> RedisAuditSink {
        RedisAuditSink {
            redis: self.redis.clone(),
        }
    }

    pub async fn ping(&self) -> bool {
        let mut redis = self.redis.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut redis)
            .await
            .is_ok()
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut redis = self.redis.clone();
        match redis.get::<_, Option<String>>(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConfirmationRepository for RedisStore {
    async fn insert(&self, confirmation: &PaymentConfirmation) -> Result<(), StoreError> {
        let payload = serde_json::to_string(confirmation)?;
        let challenge_key = confirmation_by_challenge_key(confirmation.challenge_id);
        let tx_key = confirmation_by_tx_key(&confirmation.tx_hash);

        let mut redis = self.redis.clone();
        let created: i64 = redis::cmd("MSETNX")
            .arg(&challenge_key)
            .arg(&payload)
            .arg(&tx_key)
            .arg(&payload)
            .query_async(&mut redis)
            .await?;

        if created == 1 {
            self.confirmed
                .insert(confirmation.challenge_id, confirmation.clone())
                .await;
            return Ok(());
        }

        let challenge_taken: bool = redis.exists(&challenge_key).await?;
        let key = if challenge_taken {
            UniqueKey::ChallengeId
        } else {
            UniqueKey::TxHash
        };
        tracing::debug!(
            "MSETNX rejected confirmation for {}: {:?} taken",
            confirmation.challenge_id,
            key
        );
        Err(StoreError::UniqueViolation(key))
    }

    async fn find_by_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<PaymentConfirmation>, StoreError> {
        if let Some(cached) = self.confirmed.get(&challenge_id).await {
            return Ok(Some(cached));
        }

        let found: Option<PaymentConfirmation> = self
            .get_json(&confirmation_by_challenge_key(challenge_id))
            .await?;
        if let Some(row) = &found {
            self.confirmed.insert(challenge_id, row.clone()).await;
        }
        Ok(found)
    }

    async fn find_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<PaymentConfirmation>, StoreError> {
        self.get_json(&confirmation_by_tx_key(tx_hash)).await
    }
}

#[async_trait]
impl ChallengeRepository for RedisStore {
    async fn save_challenge(&self, challenge: &PaymentChallenge) -> Result<(), StoreError> {
        let payload = serde_json::to_string(challenge)?;
        let mut redis = self.redis.clone();
        redis
            .set::<_, _, ()>(challenge_key(challenge.nonce), payload)
            .await?;
        Ok(())
    }

    async fn find_challenge(&self, nonce: Uuid) -> Result<Option<PaymentChallenge>, StoreError> {
        self.get_json(&challenge_key(nonce)).await
    }
}

/// Appends audit events to a per-track list and a global log list.
#[derive(Clone)]
pub struct RedisAuditSink {
    redis: redis::aio::ConnectionManager,
}

#[async_trait]
impl AuditSink for RedisAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event)?;
        let mut redis = self.redis.clone();
        redis::pipe()
            .atomic()
            .rpush(audit_track_key(&event.track_id), &payload)
            .ignore()
            .rpush(audit_log_key(), &payload)
            .ignore()
            .query_async::<_, ()>(&mut redis)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_keys_live_in_separate_namespaces() {
        let id = Uuid::parse_str("6f1c1f0e-8a55-4c1b-9a0e-2a1f1b6c7d8e").unwrap();
        assert_eq!(
            confirmation_by_challenge_key(id),
            "x402:confirmation:challenge:6f1c1f0e-8a55-4c1b-9a0e-2a1f1b6c7d8e"
        );
        assert_eq!(confirmation_by_tx_key("0xabc"), "x402:confirmation:tx:0xabc");
        assert_ne!(challenge_key(id), confirmation_by_challenge_key(id));
    }
}

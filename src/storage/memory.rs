use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{AuditSink, ChallengeRepository, ConfirmationRepository, StoreError, UniqueKey};
use crate::models::{AuditEvent, PaymentChallenge, PaymentConfirmation};

#[derive(Default)]
struct Tables {
    confirmations: HashMap<Uuid, PaymentConfirmation>,
    // unique index: tx hash -> challenge id
    tx_index: HashMap<String, Uuid>,
    challenges: HashMap<Uuid, PaymentChallenge>,
}

/// In-process store with the same unique keys as the Redis backend. Used
/// for tests and when no Redis is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirmation_count(&self) -> usize {
        self.tables().confirmations.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConfirmationRepository for MemoryStore {
    async fn insert(&self, confirmation: &PaymentConfirmation) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.confirmations.contains_key(&confirmation.challenge_id) {
            return Err(StoreError::UniqueViolation(UniqueKey::ChallengeId));
        }
        if tables.tx_index.contains_key(&confirmation.tx_hash) {
            return Err(StoreError::UniqueViolation(UniqueKey::TxHash));
        }
        tables
            .tx_index
            .insert(confirmation.tx_hash.clone(), confirmation.challenge_id);
        tables
            .confirmations
            .insert(confirmation.challenge_id, confirmation.clone());
        Ok(())
    }

    async fn find_by_challenge(
        &self,
        challenge_id: Uuid,
    ) -> Result<Option<PaymentConfirmation>, StoreError> {
        Ok(self.tables().confirmations.get(&challenge_id).cloned())
    }

    async fn find_by_tx_hash(
        &self,
        tx_hash: &str,
    ) -> Result<Option<PaymentConfirmation>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .tx_index
            .get(tx_hash)
            .and_then(|id| tables.confirmations.get(id))
            .cloned())
    }
}

#[async_trait]
impl ChallengeRepository for MemoryStore {
    async fn save_challenge(&self, challenge: &PaymentChallenge) -> Result<(), StoreError> {
        self.tables()
            .challenges
            .insert(challenge.nonce, challenge.clone());
        Ok(())
    }

    async fn find_challenge(&self, nonce: Uuid) -> Result<Option<PaymentChallenge>, StoreError> {
        Ok(self.tables().challenges.get(&nonce).cloned())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

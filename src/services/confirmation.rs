use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ConfirmOutcome, PaymentConfirmation};
use crate::storage::{ConfirmationRepository, StoreError, UniqueKey};

/// Records successful payments exactly once.
///
/// Every call attempts the insert. When a concurrent or earlier call already
/// owns either unique key, the backend rejects the write and the stored row
/// is read back and returned instead.
#[derive(Clone)]
pub struct ConfirmationStore {
    repository: Arc<dyn ConfirmationRepository>,
}

#[derive(Debug, Clone)]
pub struct NewConfirmation<'a> {
    pub challenge_id: Uuid,
    pub tx_hash: &'a str,
    pub payer_address: &'a str,
    pub amount_paid_atomic: &'a str,
    pub track_id: &'a str,
    pub confirmed_at: DateTime<Utc>,
}

impl ConfirmationStore {
    pub fn new(repository: Arc<dyn ConfirmationRepository>) -> Self {
        Self { repository }
    }

    pub async fn confirm(&self, new: NewConfirmation<'_>) -> Result<ConfirmOutcome, StoreError> {
        let row = PaymentConfirmation {
            challenge_id: new.challenge_id,
            tx_hash: normalize_tx_hash(new.tx_hash),
            payer_address: new.payer_address.to_string(),
            amount_paid_atomic: new.amount_paid_atomic.to_string(),
            confirmed_at: new.confirmed_at,
            track_id: new.track_id.to_string(),
        };

        match self.repository.insert(&row).await {
            Ok(()) => {
                tracing::info!(
                    "Payment confirmed for challenge {} (tx: {})",
                    row.challenge_id,
                    row.tx_hash
                );
                Ok(ConfirmOutcome::Inserted(row))
            }
            Err(StoreError::UniqueViolation(key)) => {
                tracing::debug!(
                    "Confirmation for challenge {} already exists ({:?}), reading it back",
                    row.challenge_id,
                    key
                );
                self.existing(&row, key).await.map(ConfirmOutcome::Existing)
            }
            Err(e) => Err(e),
        }
    }

    async fn existing(
        &self,
        row: &PaymentConfirmation,
        conflict: UniqueKey,
    ) -> Result<PaymentConfirmation, StoreError> {
        let (first, second) = match conflict {
            UniqueKey::ChallengeId => (UniqueKey::ChallengeId, UniqueKey::TxHash),
            UniqueKey::TxHash => (UniqueKey::TxHash, UniqueKey::ChallengeId),
        };

        for key in [first, second] {
            let found = match key {
                UniqueKey::ChallengeId => self.repository.find_by_challenge(row.challenge_id).await?,
                UniqueKey::TxHash => self.repository.find_by_tx_hash(&row.tx_hash).await?,
            };
            if let Some(existing) = found {
                return Ok(existing);
            }
        }

        Err(StoreError::Backend(format!(
            "unique violation on {:?} for challenge {} but no row found",
            conflict, row.challenge_id
        )))
    }
}

pub fn normalize_tx_hash(tx_hash: &str) -> String {
    tx_hash.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn new_confirmation(challenge_id: Uuid, tx_hash: &str) -> NewConfirmation<'_> {
        NewConfirmation {
            challenge_id,
            tx_hash,
            payer_address: "0xpayer",
            amount_paid_atomic: "3000000",
            track_id: "track-1",
            confirmed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn second_confirm_reads_existing_row() {
        let repo = Arc::new(MemoryStore::new());
        let store = ConfirmationStore::new(repo.clone());
        let id = Uuid::new_v4();

        let first = store.confirm(new_confirmation(id, "0xABC")).await.unwrap();
        let second = store.confirm(new_confirmation(id, "0xabc")).await.unwrap();

        assert!(first.is_new());
        assert!(!second.is_new());
        assert_eq!(first.confirmation(), second.confirmation());
        assert_eq!(second.confirmation().tx_hash, "0xabc");
        assert_eq!(repo.confirmation_count(), 1);
    }

    #[tokio::test]
    async fn reused_tx_hash_returns_the_owning_row() {
        let repo = Arc::new(MemoryStore::new());
        let store = ConfirmationStore::new(repo.clone());
        let owner = Uuid::new_v4();

        store.confirm(new_confirmation(owner, "0xabc")).await.unwrap();
        let replay = store
            .confirm(new_confirmation(Uuid::new_v4(), "0xabc"))
            .await
            .unwrap();

        assert!(!replay.is_new());
        assert_eq!(replay.confirmation().challenge_id, owner);
        assert_eq!(repo.confirmation_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_confirms_store_one_row() {
        let repo = Arc::new(MemoryStore::new());
        let store = ConfirmationStore::new(repo.clone());
        let id = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .confirm(NewConfirmation {
                            challenge_id: id,
                            tx_hash: "0xfeed",
                            payer_address: "0xpayer",
                            amount_paid_atomic: "3000000",
                            track_id: "track-1",
                            confirmed_at: Utc::now(),
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut inserted = 0;
        let mut rows = Vec::new();
        for handle in handles {
            let outcome = handle.await.unwrap();
            if outcome.is_new() {
                inserted += 1;
            }
            rows.push(outcome.into_confirmation());
        }

        assert_eq!(inserted, 1);
        assert_eq!(repo.confirmation_count(), 1);
        assert!(rows.windows(2).all(|w| w[0] == w[1]));
    }
}

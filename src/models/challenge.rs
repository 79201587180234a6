use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A time-bounded, single-use record of what payment satisfies a pending
/// track submission.
///
/// The nonce doubles as the challenge id. Challenges are never mutated; once
/// `expires_at` passes they are simply no longer accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    pub nonce: Uuid,
    /// Required payment in atomic units, digits only.
    pub amount: String,
    pub asset: String,
    pub chain: String,
    pub pay_to: String,
    pub track_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentChallenge {
    pub fn challenge_id(&self) -> Uuid {
        self.nonce
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Proof submitted by the client for a challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSubmission {
    pub tx_hash: String,
    /// 1-based count of submissions the client has made for this challenge.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    #[serde(default)]
    pub binding: Option<WalletBinding>,
}

fn first_attempt() -> u32 {
    1
}

/// A signed binding message proving control of the paying wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBinding {
    pub message: String,
    /// 65-byte EIP-191 signature, hex encoded.
    pub signature: String,
}

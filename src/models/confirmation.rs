use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durably recorded successful payment.
///
/// At most one row exists per `challenge_id` and per `tx_hash`; storage
/// backends enforce both as unique keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub challenge_id: Uuid,
    pub tx_hash: String,
    pub payer_address: String,
    pub amount_paid_atomic: String,
    pub confirmed_at: DateTime<Utc>,
    pub track_id: String,
}

/// Whether `confirm` wrote the row or found one already there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Inserted(PaymentConfirmation),
    Existing(PaymentConfirmation),
}

impl ConfirmOutcome {
    pub fn confirmation(&self) -> &PaymentConfirmation {
        match self {
            Self::Inserted(c) | Self::Existing(c) => c,
        }
    }

    pub fn into_confirmation(self) -> PaymentConfirmation {
        match self {
            Self::Inserted(c) | Self::Existing(c) => c,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    ChallengeCreated,
    PaymentSubmitted,
    VerificationStarted,
    VerificationSuccess,
    VerificationFailed,
    PaymentConfirmed,
    PaymentExpired,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChallengeCreated => "CHALLENGE_CREATED",
            Self::PaymentSubmitted => "PAYMENT_SUBMITTED",
            Self::VerificationStarted => "VERIFICATION_STARTED",
            Self::VerificationSuccess => "VERIFICATION_SUCCESS",
            Self::VerificationFailed => "VERIFICATION_FAILED",
            Self::PaymentConfirmed => "PAYMENT_CONFIRMED",
            Self::PaymentExpired => "PAYMENT_EXPIRED",
        }
    }
}

/// One entry of the append-only payment lifecycle log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub track_id: String,
    pub event_type: AuditEventType,
    pub metadata: serde_json::Value,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

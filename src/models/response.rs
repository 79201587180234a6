use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PaymentChallenge, PaymentConfirmation};

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub store: String,
    pub redis: bool,
    pub provider: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

/// Body of the `402 Payment Required` answer to a track submission.
#[derive(Serialize, Deserialize, Debug)]
pub struct PaymentRequiredResponse {
    #[serde(rename = "type")]
    pub type_: String,
    pub version: String,
    pub challenge: PaymentChallenge,
    pub instructions: PaymentFormat,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentFormat {
    pub endpoint: String,
    pub proof: String,
    pub binding_header: String,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub success: bool,
    pub confirmation: PaymentConfirmation,
    pub newly_confirmed: bool,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

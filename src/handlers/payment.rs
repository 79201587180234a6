use super::AppState;
use crate::{
    error::PaymentError,
    models::{ConfirmationResponse, PaymentSubmission},
};
use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub challenge_id: Uuid,
    #[serde(flatten)]
    pub submission: PaymentSubmission,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<ConfirmationResponse>, PaymentError> {
    let settlement = state
        .payments
        .submit_payment(request.challenge_id, &request.submission)
        .await?;

    Ok(Json(ConfirmationResponse {
        success: true,
        confirmation: settlement.confirmation,
        newly_confirmed: settlement.newly_confirmed,
        timestamp: Utc::now(),
        request_id: settlement.correlation_id.to_string(),
    }))
}

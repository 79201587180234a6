use super::AppState;
use crate::{
    error::PaymentError,
    models::{PaymentFormat, PaymentRequiredResponse},
    services::binding::BINDING_HEADER,
};
use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Deserialize;

pub const VERIFY_ENDPOINT: &str = "/api/payments/verify";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub price_usd: Decimal,
    pub track_id: String,
}

/// Answers a priced track submission with `402 Payment Required`.
pub async fn create_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<(StatusCode, Json<PaymentRequiredResponse>), PaymentError> {
    let challenge = state
        .payments
        .issue_challenge(request.price_usd, &request.track_id)
        .await?;

    Ok((
        StatusCode::PAYMENT_REQUIRED,
        Json(PaymentRequiredResponse {
            type_: "x402".to_string(),
            version: "1".to_string(),
            challenge,
            instructions: PaymentFormat {
                endpoint: VERIFY_ENDPOINT.to_string(),
                proof: "txHash".to_string(),
                binding_header: BINDING_HEADER.to_string(),
            },
        }),
    ))
}

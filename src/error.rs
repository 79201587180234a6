use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{VerificationCode, VerificationFailure};
use crate::services::binding::BindingError;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment verification failed ({code}): {message}")]
    Verification {
        code: VerificationCode,
        message: String,
        detail: Option<String>,
    },

    #[error("Payment provider unavailable: {message}")]
    Provider {
        message: String,
        detail: Option<String>,
    },

    #[error("Invalid wallet binding: {0}")]
    Binding(#[from] BindingError),

    #[error("Challenge not found: {0}")]
    ChallengeNotFound(Uuid),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<VerificationFailure> for PaymentError {
    fn from(failure: VerificationFailure) -> Self {
        match failure.code {
            VerificationCode::ProviderError => PaymentError::Provider {
                message: failure.message,
                detail: failure.detail,
            },
            code => PaymentError::Verification {
                code,
                message: failure.message,
                detail: failure.detail,
            },
        }
    }
}

impl PaymentError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::Configuration(_) => "CONFIGURATION_ERROR",
            PaymentError::Validation(_) | PaymentError::Binding(_) => "VALIDATION_ERROR",
            PaymentError::Verification { code, .. } => code.as_str(),
            PaymentError::Provider { .. } => VerificationCode::ProviderError.as_str(),
            PaymentError::ChallengeNotFound(_) => "CHALLENGE_NOT_FOUND",
            PaymentError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the client may resubmit the same proof later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, PaymentError::Provider { .. })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    pub retriable: bool,
    pub timestamp: chrono::DateTime<Utc>,
    pub request_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();

        let status = match &self {
            PaymentError::Configuration(_) | PaymentError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            PaymentError::Verification {
                code: VerificationCode::Expired,
                ..
            } => StatusCode::GONE,
            PaymentError::ChallengeNotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Validation(_)
            | PaymentError::Binding(_)
            | PaymentError::Verification { .. }
            | PaymentError::Provider { .. } => StatusCode::BAD_REQUEST,
        };

        // Server-side failures keep their cause in the log only.
        let (error, detail) = match &self {
            PaymentError::Configuration(_) | PaymentError::Storage(_) => {
                ("Internal server error".to_string(), None)
            }
            PaymentError::Verification { detail, .. } | PaymentError::Provider { detail, .. } => {
                (self.to_string(), detail.clone())
            }
            PaymentError::Binding(err) => (self.to_string(), Some(err.code().to_string())),
            _ => (self.to_string(), None),
        };

        let body = ErrorResponse {
            success: false,
            error,
            error_code: self.error_code().to_string(),
            retriable: self.is_retriable(),
            timestamp: Utc::now(),
            request_id,
            detail,
        };

        if status.is_server_error() {
            tracing::error!(error = ?self, error_code = body.error_code, "Request failed");
        } else {
            tracing::warn!(error = %self, error_code = body.error_code, "Request rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failures_become_retriable_provider_errors() {
        let err = PaymentError::from(VerificationFailure {
            code: VerificationCode::ProviderError,
            message: "facilitator verification unavailable".to_string(),
            detail: Some("upstream returned HTTP 503".to_string()),
        });
        assert!(matches!(
            &err,
            PaymentError::Provider { detail: Some(d), .. } if d == "upstream returned HTTP 503"
        ));
        assert!(err.is_retriable());
        assert_eq!(err.error_code(), "PROVIDER_ERROR");
    }

    async fn body_of(err: PaymentError) -> ErrorResponse {
        let bytes = axum::body::to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn provider_detail_reaches_response_body() {
        let body = body_of(PaymentError::Provider {
            message: "cdp verification unavailable".to_string(),
            detail: Some("upstream timed out after 10000ms".to_string()),
        })
        .await;
        assert_eq!(body.error_code, "PROVIDER_ERROR");
        assert!(body.retriable);
        assert_eq!(body.detail.as_deref(), Some("upstream timed out after 10000ms"));
    }

    #[tokio::test]
    async fn binding_code_reaches_response_body() {
        let body = body_of(PaymentError::from(BindingError::ClockSkew {
            skew_secs: 3600,
            allowed_secs: 120,
        }))
        .await;
        assert_eq!(body.error_code, "VALIDATION_ERROR");
        assert_eq!(body.detail.as_deref(), Some("CLOCK_SKEW"));
        assert!(!body.retriable);
    }

    #[test]
    fn semantic_failures_keep_their_code() {
        let err = PaymentError::from(VerificationFailure {
            code: VerificationCode::WrongAmount,
            message: "Insufficient payment".to_string(),
            detail: Some("expected 3000000, got 2000000".to_string()),
        });
        assert_eq!(err.error_code(), "WRONG_AMOUNT");
        assert!(!err.is_retriable());
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        let expired = PaymentError::Verification {
            code: VerificationCode::Expired,
            message: "Challenge expired".to_string(),
            detail: None,
        };
        assert_eq!(expired.into_response().status(), StatusCode::GONE);

        let config = PaymentError::Configuration("X402_PAY_TO not set".to_string());
        assert_eq!(
            config.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let provider = PaymentError::Provider {
            message: "timeout".to_string(),
            detail: None,
        };
        assert_eq!(provider.into_response().status(), StatusCode::BAD_REQUEST);
    }
}

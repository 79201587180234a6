use async_trait::async_trait;
use serde_json::json;

use super::http::VerifyEndpoint;
use super::retry::RetryPolicy;
use super::PaymentVerifier;
use crate::error::PaymentError;
use crate::models::{VerificationResult, VerifyInput};

/// Verifies payments against the CDP sandbox API.
#[derive(Debug, Clone)]
pub struct CdpVerifier {
    endpoint: VerifyEndpoint,
}

impl CdpVerifier {
    pub fn new(base_url: &str, api_key: &str, policy: RetryPolicy) -> Result<Self, PaymentError> {
        if api_key.trim().is_empty() {
            return Err(PaymentError::Configuration(
                "CDP_API_KEY is required for the cdp provider".to_string(),
            ));
        }
        let endpoint = VerifyEndpoint::new("cdp", base_url, policy)
            .with_header("authorization", &format!("Bearer {}", api_key.trim()))?;
        Ok(Self { endpoint })
    }
}

#[async_trait]
impl PaymentVerifier for CdpVerifier {
    fn name(&self) -> &'static str {
        "cdp"
    }

    async fn verify_payment(&self, input: &VerifyInput) -> VerificationResult {
        let body = json!({
            "txHash": input.tx_hash,
            "payTo": input.pay_to,
            "amountAtomic": input.amount_atomic.to_string(),
            "asset": input.asset,
            "chain": input.chain,
            "challengeId": input.challenge_id,
        });
        self.endpoint.verify(&body, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_api_key() {
        let err = CdpVerifier::new("http://localhost", "  ", RetryPolicy::cdp()).unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
    }

    #[test]
    fn rejects_unprintable_api_key() {
        let err = CdpVerifier::new("http://localhost", "key\nwith-newline", RetryPolicy::cdp())
            .unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
    }
}

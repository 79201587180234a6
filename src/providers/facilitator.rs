use async_trait::async_trait;
use serde_json::{json, Value};

use super::http::VerifyEndpoint;
use super::retry::RetryPolicy;
use super::PaymentVerifier;
use crate::error::PaymentError;
use crate::models::{VerificationResult, VerifyInput};

/// Verifies payments through a generic x402 REST facilitator.
#[derive(Debug, Clone)]
pub struct FacilitatorVerifier {
    endpoint: VerifyEndpoint,
    token_address: Option<String>,
    chain_id: Option<u64>,
}

impl FacilitatorVerifier {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        policy: RetryPolicy,
    ) -> Result<Self, PaymentError> {
        let mut endpoint = VerifyEndpoint::new("facilitator", base_url, policy);
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            endpoint = endpoint.with_header("x-api-key", key)?;
        }
        Ok(Self {
            endpoint,
            token_address: None,
            chain_id: None,
        })
    }

    pub fn with_token_address(mut self, token_address: impl Into<String>) -> Self {
        self.token_address = Some(token_address.into());
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    fn request_body(&self, input: &VerifyInput) -> Value {
        let mut body = json!({
            "chain": input.chain,
            "asset": input.asset,
            "amountAtomic": input.amount_atomic.to_string(),
            "payTo": input.pay_to,
            "txHash": input.tx_hash,
        });
        if let Some(token_address) = &self.token_address {
            body["tokenAddress"] = json!(token_address);
        }
        if let Some(chain_id) = self.chain_id {
            body["chainId"] = json!(chain_id);
        }
        body
    }
}

#[async_trait]
impl PaymentVerifier for FacilitatorVerifier {
    fn name(&self) -> &'static str {
        "facilitator"
    }

    async fn verify_payment(&self, input: &VerifyInput) -> VerificationResult {
        let body = self.request_body(input);
        self.endpoint.verify(&body, input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use uuid::Uuid;

    fn input() -> VerifyInput {
        VerifyInput {
            pay_to: "0xpayee".to_string(),
            amount_atomic: U256::from(3_000_000u64),
            asset: "USDC".to_string(),
            chain: "base-sepolia".to_string(),
            challenge_id: Uuid::new_v4(),
            tx_hash: "0xabc".to_string(),
        }
    }

    #[test]
    fn optional_token_fields_are_omitted_when_unset() {
        let verifier =
            FacilitatorVerifier::new("http://localhost", None, RetryPolicy::facilitator()).unwrap();
        let body = verifier.request_body(&input());
        assert_eq!(body["amountAtomic"], json!("3000000"));
        assert!(body.get("tokenAddress").is_none());
        assert!(body.get("chainId").is_none());
        assert!(body.get("challengeId").is_none());
    }

    #[test]
    fn token_fields_are_sent_when_configured() {
        let verifier =
            FacilitatorVerifier::new("http://localhost", Some("key"), RetryPolicy::facilitator())
                .unwrap()
                .with_token_address("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
                .with_chain_id(84532);
        let body = verifier.request_body(&input());
        assert_eq!(
            body["tokenAddress"],
            json!("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
        );
        assert_eq!(body["chainId"], json!(84532));
    }
}

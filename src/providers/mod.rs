//! Upstream payment verification backends.
//!
//! Every backend implements [`PaymentVerifier`] and returns a
//! [`VerificationResult`] on every path. Retries stay inside the adapter;
//! callers only see the extra latency.

pub mod cdp;
pub mod facilitator;
pub mod http;
pub mod response;
pub mod retry;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Config, ProviderConfig};
use crate::error::PaymentError;
use crate::models::{VerificationResult, VerifyInput};

pub use cdp::CdpVerifier;
pub use facilitator::FacilitatorVerifier;
pub use retry::RetryPolicy;

#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn verify_payment(&self, input: &VerifyInput) -> VerificationResult;
}

/// Builds the backend selected by `PAYMENT_PROVIDER`.
pub fn build_verifier(config: &Config) -> Result<Arc<dyn PaymentVerifier>, PaymentError> {
    let policy = config.retry_policy();
    let verifier: Arc<dyn PaymentVerifier> = match &config.provider {
        ProviderConfig::Cdp { api_url, api_key } => {
            Arc::new(CdpVerifier::new(api_url, api_key, policy)?)
        }
        ProviderConfig::Facilitator { url, api_key } => {
            let mut facilitator = FacilitatorVerifier::new(url, api_key.as_deref(), policy)?;
            if let Some(token) = &config.token_address {
                facilitator = facilitator.with_token_address(token.clone());
            }
            if let Some(chain_id) = config.chain_id {
                facilitator = facilitator.with_chain_id(chain_id);
            }
            Arc::new(facilitator)
        }
    };

    tracing::info!("Payment verification via {}", verifier.name());
    Ok(verifier)
}

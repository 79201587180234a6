use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::challenge::ChallengeBuilder;
use super::orchestrator::{Settlement, VerificationOrchestrator};
use crate::error::PaymentError;
use crate::models::{PaymentChallenge, PaymentSubmission};
use crate::storage::ChallengeRepository;

/// Entry point used by the HTTP handlers: issues challenges and settles
/// submissions against previously issued ones.
pub struct PaymentService {
    builder: ChallengeBuilder,
    challenges: Arc<dyn ChallengeRepository>,
    orchestrator: VerificationOrchestrator,
}

impl PaymentService {
    pub fn new(
        builder: ChallengeBuilder,
        challenges: Arc<dyn ChallengeRepository>,
        orchestrator: VerificationOrchestrator,
    ) -> Self {
        Self {
            builder,
            challenges,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &VerificationOrchestrator {
        &self.orchestrator
    }

    pub async fn issue_challenge(
        &self,
        price_usd: Decimal,
        track_id: &str,
    ) -> Result<PaymentChallenge, PaymentError> {
        let challenge = self.builder.build_challenge(price_usd, track_id).await?;
        self.challenges.save_challenge(&challenge).await?;
        Ok(challenge)
    }

    pub async fn submit_payment(
        &self,
        challenge_id: Uuid,
        submission: &PaymentSubmission,
    ) -> Result<Settlement, PaymentError> {
        let challenge = self
            .challenges
            .find_challenge(challenge_id)
            .await?
            .ok_or(PaymentError::ChallengeNotFound(challenge_id))?;
        self.orchestrator.settle(&challenge, submission).await
    }
}

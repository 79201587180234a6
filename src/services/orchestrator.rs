//! Drives one payment submission from issued challenge to a terminal state.
//!
//! ```text
//! ChallengeIssued ──> Verifying ──> Confirmed
//!        │                 └──────> Rejected(code)
//!        └──────────> Expired
//! ```
//!
//! The expiry guard runs before anything else: an expired challenge never
//! reaches a provider.

use async_trait::async_trait;
use ethers::types::{H256, U256};
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use super::audit::AuditTrail;
use super::binding::{self, DEFAULT_CLOCK_SKEW_SECS};
use super::clock::Clock;
use super::confirmation::{normalize_tx_hash, ConfirmationStore, NewConfirmation};
use crate::error::PaymentError;
use crate::models::{
    AuditEventType, PaymentChallenge, PaymentConfirmation, PaymentSubmission, VerificationCode,
    VerificationResult, VerifyInput,
};
use crate::providers::PaymentVerifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "state", content = "code")]
pub enum VerificationState {
    ChallengeIssued,
    Verifying,
    Confirmed,
    Rejected(VerificationCode),
    Expired,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Illegal verification transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: VerificationState,
    pub to: VerificationState,
}

impl VerificationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VerificationState::Confirmed
                | VerificationState::Rejected(_)
                | VerificationState::Expired
        )
    }

    pub fn transition(self, to: VerificationState) -> Result<VerificationState, InvalidTransition> {
        use VerificationState::*;
        match (self, to) {
            (ChallengeIssued, Verifying)
            | (ChallengeIssued, Expired)
            | (Verifying, Confirmed)
            | (Verifying, Rejected(_)) => Ok(to),
            _ => Err(InvalidTransition { from: self, to }),
        }
    }
}

/// Downstream effect of a confirmed payment, e.g. flipping a track to PAID.
#[async_trait]
pub trait TrackStatusUpdater: Send + Sync {
    async fn mark_paid(&self, confirmation: &PaymentConfirmation) -> anyhow::Result<()>;
}

/// Used when no track service is wired in.
#[derive(Debug, Default)]
pub struct LoggingTrackUpdater;

#[async_trait]
impl TrackStatusUpdater for LoggingTrackUpdater {
    async fn mark_paid(&self, confirmation: &PaymentConfirmation) -> anyhow::Result<()> {
        tracing::info!(
            "Track {} paid by {} (challenge {})",
            confirmation.track_id,
            confirmation.payer_address,
            confirmation.challenge_id
        );
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub state: VerificationState,
    pub result: VerificationResult,
    pub correlation_id: Uuid,
    /// Wallet recovered from the binding signature, when one was supplied.
    pub bound_wallet: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub confirmation: PaymentConfirmation,
    pub newly_confirmed: bool,
    pub correlation_id: Uuid,
}

pub struct VerificationOrchestrator {
    verifier: Arc<dyn PaymentVerifier>,
    confirmations: ConfirmationStore,
    audit: AuditTrail,
    clock: Arc<dyn Clock>,
    tracks: Arc<dyn TrackStatusUpdater>,
    clock_skew_secs: i64,
}

impl VerificationOrchestrator {
    pub fn new(
        verifier: Arc<dyn PaymentVerifier>,
        confirmations: ConfirmationStore,
        audit: AuditTrail,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            confirmations,
            audit,
            clock,
            tracks: Arc::new(LoggingTrackUpdater),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }

    pub fn with_track_updater(mut self, tracks: Arc<dyn TrackStatusUpdater>) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn with_clock_skew(mut self, clock_skew_secs: i64) -> Self {
        self.clock_skew_secs = clock_skew_secs;
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.verifier.name()
    }

    /// Runs the state machine up to a terminal state without persisting
    /// anything but audit events.
    ///
    /// Returns `Err` only for malformed input (bad tx hash, bad binding);
    /// every provider outcome, including expiry, is reported in the
    /// returned [`VerificationOutcome`].
    pub async fn verify_payment(
        &self,
        challenge: &PaymentChallenge,
        submission: &PaymentSubmission,
        correlation_id: Uuid,
    ) -> Result<VerificationOutcome, PaymentError> {
        let started = Instant::now();
        let state = VerificationState::ChallengeIssued;
        let tx_hash = normalize_tx_hash(&submission.tx_hash);

        self.audit
            .record(
                &challenge.track_id,
                AuditEventType::PaymentSubmitted,
                correlation_id,
                json!({
                    "challengeId": challenge.nonce,
                    "txHash": tx_hash,
                    "attempt": submission.attempt,
                }),
            )
            .await;

        let now = self.clock.now();
        if challenge.is_expired_at(now) {
            let state = self.advance(state, VerificationState::Expired)?;
            tracing::info!("Challenge {} expired at {}", challenge.nonce, challenge.expires_at);
            self.audit
                .record(
                    &challenge.track_id,
                    AuditEventType::PaymentExpired,
                    correlation_id,
                    json!({
                        "challengeId": challenge.nonce,
                        "expiresAt": challenge.expires_at,
                    }),
                )
                .await;
            return Ok(VerificationOutcome {
                state,
                result: VerificationResult::rejected_with_detail(
                    VerificationCode::Expired,
                    "Payment challenge has expired",
                    format!("expired at {}", challenge.expires_at.to_rfc3339()),
                ),
                correlation_id,
                bound_wallet: None,
                duration_ms: elapsed_ms(started),
            });
        }

        if H256::from_str(&tx_hash).is_err() || !tx_hash.starts_with("0x") {
            return Err(PaymentError::Validation(format!(
                "Invalid tx hash: {}",
                submission.tx_hash
            )));
        }
        let amount_atomic = U256::from_dec_str(&challenge.amount).map_err(|_| {
            PaymentError::Validation(format!("Invalid challenge amount: {}", challenge.amount))
        })?;

        let bound_wallet = match &submission.binding {
            Some(wallet_binding) => {
                let parsed = binding::validate(
                    &wallet_binding.message,
                    challenge.nonce,
                    now.timestamp(),
                    self.clock_skew_secs,
                )?;
                let signer =
                    binding::recover_signer(&wallet_binding.message, &wallet_binding.signature)?;
                tracing::debug!(
                    "Wallet binding accepted ({}), signer {:?}",
                    binding::mask_for_logging(&parsed),
                    signer
                );
                Some(format!("{:?}", signer))
            }
            None => None,
        };

        let state = self.advance(state, VerificationState::Verifying)?;
        self.audit
            .record(
                &challenge.track_id,
                AuditEventType::VerificationStarted,
                correlation_id,
                json!({
                    "challengeId": challenge.nonce,
                    "attempt": submission.attempt,
                    "provider": self.verifier.name(),
                }),
            )
            .await;

        let input = VerifyInput {
            pay_to: challenge.pay_to.clone(),
            amount_atomic,
            asset: challenge.asset.clone(),
            chain: challenge.chain.clone(),
            challenge_id: challenge.nonce,
            tx_hash: tx_hash.clone(),
        };
        let result = self.verifier.verify_payment(&input).await;
        let result = check_bound_wallet(result, bound_wallet.as_deref());
        let duration_ms = elapsed_ms(started);

        let state = match &result {
            VerificationResult::Verified(payment) => {
                self.audit
                    .record(
                        &challenge.track_id,
                        AuditEventType::VerificationSuccess,
                        correlation_id,
                        json!({
                            "challengeId": challenge.nonce,
                            "txHash": tx_hash,
                            "blockNumber": payment.block_number,
                            "amountPaidAtomic": payment.amount_paid_atomic.to_string(),
                            "payer": payment.payer,
                            "relayed": payment.true_payer.is_relayed(),
                            "durationMs": duration_ms,
                        }),
                    )
                    .await;
                self.advance(state, VerificationState::Confirmed)?
            }
            VerificationResult::Rejected(failure) => {
                self.audit
                    .record(
                        &challenge.track_id,
                        AuditEventType::VerificationFailed,
                        correlation_id,
                        json!({
                            "challengeId": challenge.nonce,
                            "txHash": tx_hash,
                            "code": failure.code,
                            "message": failure.message,
                            "detail": failure.detail,
                            "durationMs": duration_ms,
                        }),
                    )
                    .await;
                self.advance(state, VerificationState::Rejected(failure.code))?
            }
        };

        Ok(VerificationOutcome {
            state,
            result,
            correlation_id,
            bound_wallet,
            duration_ms,
        })
    }

    /// Verifies the submission and, on success, records the confirmation
    /// and notifies the track collaborator once.
    pub async fn settle(
        &self,
        challenge: &PaymentChallenge,
        submission: &PaymentSubmission,
    ) -> Result<Settlement, PaymentError> {
        let correlation_id = Uuid::new_v4();
        let outcome = self
            .verify_payment(challenge, submission, correlation_id)
            .await?;

        let payment = match outcome.result {
            VerificationResult::Verified(payment) => payment,
            VerificationResult::Rejected(failure) => return Err(failure.into()),
        };

        let payer = payment
            .payer
            .or(outcome.bound_wallet)
            .unwrap_or_else(|| "unknown".to_string());
        let amount = payment.amount_paid_atomic.to_string();
        let confirmed = self
            .confirmations
            .confirm(NewConfirmation {
                challenge_id: challenge.nonce,
                tx_hash: &submission.tx_hash,
                payer_address: &payer,
                amount_paid_atomic: &amount,
                track_id: &challenge.track_id,
                confirmed_at: self.clock.now(),
            })
            .await?;

        let newly_confirmed = confirmed.is_new();
        let confirmation = confirmed.into_confirmation();
        if confirmation.challenge_id != challenge.nonce {
            tracing::warn!(
                "Tx {} already confirmed challenge {}, refusing it for {}",
                confirmation.tx_hash,
                confirmation.challenge_id,
                challenge.nonce
            );
            return Err(PaymentError::Verification {
                code: VerificationCode::NoMatch,
                message: "Transaction was already used for another payment".to_string(),
                detail: None,
            });
        }

        if newly_confirmed {
            self.audit
                .record(
                    &challenge.track_id,
                    AuditEventType::PaymentConfirmed,
                    correlation_id,
                    json!({
                        "challengeId": confirmation.challenge_id,
                        "txHash": confirmation.tx_hash,
                        "payer": confirmation.payer_address,
                        "amountPaidAtomic": confirmation.amount_paid_atomic,
                    }),
                )
                .await;
            if let Err(e) = self.tracks.mark_paid(&confirmation).await {
                tracing::error!(
                    "Failed to mark track {} paid after confirmation {}: {}",
                    confirmation.track_id,
                    confirmation.challenge_id,
                    e
                );
            }
        }

        Ok(Settlement {
            confirmation,
            newly_confirmed,
            correlation_id,
        })
    }

    fn advance(
        &self,
        from: VerificationState,
        to: VerificationState,
    ) -> Result<VerificationState, PaymentError> {
        from.transition(to)
            .map_err(|e| PaymentError::Validation(e.to_string()))
    }
}

/// A verified payment whose funds came from a wallet other than the one
/// that signed the binding is treated as someone else's payment.
fn check_bound_wallet(result: VerificationResult, bound_wallet: Option<&str>) -> VerificationResult {
    let mismatch = match (&result, bound_wallet) {
        (VerificationResult::Verified(payment), Some(wallet)) => payment
            .payer
            .as_deref()
            .filter(|payer| !payer.eq_ignore_ascii_case(wallet))
            .map(|payer| (wallet.to_string(), payer.to_string())),
        _ => None,
    };

    match mismatch {
        Some((wallet, payer)) => {
            tracing::warn!("Payer {} does not match bound wallet {}", payer, wallet);
            VerificationResult::rejected_with_detail(
                VerificationCode::NoMatch,
                "Payer does not match the bound wallet",
                format!("expected {}, got {}", wallet, payer),
            )
        }
        None => result,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

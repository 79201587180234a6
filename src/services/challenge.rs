use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::audit::AuditTrail;
use super::clock::Clock;
use crate::error::PaymentError;
use crate::models::{AuditEventType, PaymentChallenge};

pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 15 * 60;

/// What every challenge issued by this service asks for.
#[derive(Debug, Clone)]
pub struct ChallengeSettings {
    pub pay_to: Option<String>,
    pub asset: String,
    pub chain: String,
    pub asset_decimals: u32,
    pub ttl: Duration,
}

impl Default for ChallengeSettings {
    fn default() -> Self {
        Self {
            pay_to: None,
            asset: "USDC".to_string(),
            chain: "base-sepolia".to_string(),
            asset_decimals: 6,
            ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
        }
    }
}

pub struct ChallengeBuilder {
    settings: ChallengeSettings,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl ChallengeBuilder {
    pub fn new(settings: ChallengeSettings, clock: Arc<dyn Clock>, audit: AuditTrail) -> Self {
        Self {
            settings,
            clock,
            audit,
        }
    }

    pub async fn build_challenge(
        &self,
        price_usd: Decimal,
        track_id: &str,
    ) -> Result<PaymentChallenge, PaymentError> {
        let track_id = track_id.trim();
        if track_id.is_empty() {
            return Err(PaymentError::Validation("trackId must not be empty".to_string()));
        }
        if price_usd <= Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "priceUsd must be greater than zero, got {}",
                price_usd
            )));
        }
        let pay_to = self
            .settings
            .pay_to
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PaymentError::Configuration("X402_PAY_TO is not set".to_string()))?;

        let amount = to_atomic_units(price_usd, self.settings.asset_decimals)?;
        if amount == 0 {
            return Err(PaymentError::Validation(format!(
                "priceUsd {} is below one atomic unit of {}",
                price_usd, self.settings.asset
            )));
        }

        let created_at = self.clock.now();
        let challenge = PaymentChallenge {
            nonce: Uuid::new_v4(),
            amount: amount.to_string(),
            asset: self.settings.asset.clone(),
            chain: self.settings.chain.clone(),
            pay_to: pay_to.to_string(),
            track_id: track_id.to_string(),
            created_at,
            expires_at: created_at + self.settings.ttl,
        };

        tracing::info!(
            "Challenge {} issued for track {}: {} {} on {}",
            challenge.nonce,
            challenge.track_id,
            challenge.amount,
            challenge.asset,
            challenge.chain
        );

        self.audit
            .record(
                &challenge.track_id,
                AuditEventType::ChallengeCreated,
                challenge.nonce,
                json!({
                    "challengeId": challenge.nonce,
                    "amount": challenge.amount,
                    "asset": challenge.asset,
                    "chain": challenge.chain,
                    "expiresAt": challenge.expires_at,
                }),
            )
            .await;

        Ok(challenge)
    }
}

/// `floor(price × 10^decimals)`, in exact decimal arithmetic.
pub fn to_atomic_units(price: Decimal, decimals: u32) -> Result<u128, PaymentError> {
    let scale = 10u64
        .checked_pow(decimals)
        .ok_or_else(|| PaymentError::Configuration(format!("unsupported asset decimals {}", decimals)))?;
    price
        .checked_mul(Decimal::from(scale))
        .map(|scaled| scaled.floor())
        .and_then(|atomic| atomic.to_u128())
        .ok_or_else(|| PaymentError::Validation(format!("priceUsd {} is out of range", price)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use crate::storage::MemoryAuditSink;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn builder(pay_to: Option<&str>) -> (ChallengeBuilder, Arc<MemoryAuditSink>) {
        let sink = Arc::new(MemoryAuditSink::new());
        let clock: Arc<ManualClock> = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap(),
        ));
        let settings = ChallengeSettings {
            pay_to: pay_to.map(str::to_string),
            ..ChallengeSettings::default()
        };
        (
            ChallengeBuilder::new(settings, clock.clone(), AuditTrail::new(sink.clone(), clock)),
            sink,
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn converts_to_atomic_units_with_floor() {
        assert_eq!(to_atomic_units(dec("3.00"), 6).unwrap(), 3_000_000);
        assert_eq!(to_atomic_units(dec("0.01"), 6).unwrap(), 10_000);
        assert_eq!(to_atomic_units(dec("1.2345679"), 6).unwrap(), 1_234_567);
        assert_eq!(to_atomic_units(dec("0.1"), 18).unwrap(), 100_000_000_000_000_000);
        assert_eq!(to_atomic_units(dec("0.0000001"), 6).unwrap(), 0);
    }

    #[tokio::test]
    async fn builds_challenge_for_three_dollars() {
        let (builder, sink) = builder(Some("0x5B38Da6a701c568545dCfcB03FcB875f56beddC4"));
        let challenge = builder.build_challenge(dec("3.00"), "track-42").await.unwrap();

        assert_eq!(challenge.amount, "3000000");
        assert!(challenge.amount.bytes().all(|b| b.is_ascii_digit()));
        assert_eq!(challenge.asset, "USDC");
        assert_eq!(challenge.chain, "base-sepolia");
        assert_eq!(challenge.expires_at - challenge.created_at, Duration::minutes(15));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::ChallengeCreated);
        assert_eq!(events[0].track_id, "track-42");
    }

    #[tokio::test]
    async fn nonces_are_unique() {
        let (builder, _) = builder(Some("0xpayee"));
        let a = builder.build_challenge(dec("1"), "t").await.unwrap();
        let b = builder.build_challenge(dec("1"), "t").await.unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let (builder, sink) = builder(Some("0xpayee"));
        assert!(matches!(
            builder.build_challenge(dec("0"), "track").await,
            Err(PaymentError::Validation(_))
        ));
        assert!(matches!(
            builder.build_challenge(dec("-1.5"), "track").await,
            Err(PaymentError::Validation(_))
        ));
        assert!(matches!(
            builder.build_challenge(dec("1.00"), "  ").await,
            Err(PaymentError::Validation(_))
        ));
        assert!(matches!(
            builder.build_challenge(dec("0.0000001"), "track").await,
            Err(PaymentError::Validation(_))
        ));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn missing_payee_is_configuration_error() {
        let (builder, _) = builder(None);
        assert!(matches!(
            builder.build_challenge(dec("3.00"), "track").await,
            Err(PaymentError::Configuration(_))
        ));
    }
}

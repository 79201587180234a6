use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Reason codes an upstream verification can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationCode {
    WrongAmount,
    WrongAsset,
    WrongChain,
    NoMatch,
    Expired,
    ProviderError,
}

impl VerificationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WrongAmount => "WRONG_AMOUNT",
            Self::WrongAsset => "WRONG_ASSET",
            Self::WrongChain => "WRONG_CHAIN",
            Self::NoMatch => "NO_MATCH",
            Self::Expired => "EXPIRED",
            Self::ProviderError => "PROVIDER_ERROR",
        }
    }

    /// Maps an upstream error code onto ours. Providers disagree on naming,
    /// so a handful of known synonyms are accepted.
    pub fn from_upstream(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "WRONG_AMOUNT" | "INSUFFICIENT_AMOUNT" | "AMOUNT_MISMATCH" => Some(Self::WrongAmount),
            "WRONG_ASSET" | "ASSET_MISMATCH" | "UNSUPPORTED_ASSET" => Some(Self::WrongAsset),
            "WRONG_CHAIN" | "CHAIN_MISMATCH" | "UNSUPPORTED_NETWORK" => Some(Self::WrongChain),
            "NO_MATCH" | "TX_NOT_FOUND" | "RECIPIENT_MISMATCH" => Some(Self::NoMatch),
            "EXPIRED" => Some(Self::Expired),
            "PROVIDER_ERROR" => Some(Self::ProviderError),
            _ => None,
        }
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller expects the proof to satisfy.
#[derive(Debug, Clone)]
pub struct VerifyInput {
    pub pay_to: String,
    pub amount_atomic: U256,
    pub asset: String,
    pub chain: String,
    pub challenge_id: Uuid,
    pub tx_hash: String,
}

/// Who actually moved the funds, as far as the provider tells us.
///
/// The ERC-20 `Transfer` emitter and the transaction sender differ when a
/// relayer or router submits on the payer's behalf. Heuristic, provider
/// specific, and never required for a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TruePayer {
    pub transfer_from: Option<String>,
    pub tx_sender: Option<String>,
}

impl TruePayer {
    pub fn best_guess(&self) -> Option<&str> {
        self.transfer_from
            .as_deref()
            .or(self.tx_sender.as_deref())
    }

    pub fn is_relayed(&self) -> bool {
        match (&self.transfer_from, &self.tx_sender) {
            (Some(from), Some(sender)) => !from.eq_ignore_ascii_case(sender),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPayment {
    #[serde(with = "u256_decimal")]
    pub amount_paid_atomic: U256,
    pub payer: Option<String>,
    pub true_payer: TruePayer,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub code: VerificationCode,
    pub message: String,
    pub detail: Option<String>,
}

/// Outcome of a single verification attempt against one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Verified(VerifiedPayment),
    Rejected(VerificationFailure),
}

impl VerificationResult {
    pub fn rejected(code: VerificationCode, message: impl Into<String>) -> Self {
        Self::Rejected(VerificationFailure {
            code,
            message: message.into(),
            detail: None,
        })
    }

    pub fn rejected_with_detail(
        code: VerificationCode,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Rejected(VerificationFailure {
            code,
            message: message.into(),
            detail: Some(detail.into()),
        })
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    pub fn code(&self) -> Option<VerificationCode> {
        match self {
            Self::Verified(_) => None,
            Self::Rejected(failure) => Some(failure.code),
        }
    }
}

// Wire shape: `{ok:true, amountPaidAtomic, payer, ...}` or
// `{ok:false, code, message, detail}`.
impl Serialize for VerificationResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T: Serialize> {
            ok: bool,
            #[serde(flatten)]
            inner: &'a T,
        }

        match self {
            Self::Verified(v) => Tagged { ok: true, inner: v }.serialize(serializer),
            Self::Rejected(f) => Tagged { ok: false, inner: f }.serialize(serializer),
        }
    }
}

pub(crate) mod u256_decimal {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
    }
}

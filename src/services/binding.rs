//! Wallet binding messages.
//!
//! A binding message ties a wallet signature to one payment challenge so the
//! service can tell who controls the paying wallet independently of the
//! on-chain transaction, which a relayer or router may have submitted on the
//! payer's behalf. The message is three lines, joined with `\n`:
//!
//! ```text
//! Agent DJ Radio Wallet Binding v1
//! challengeId=<uuid>; ts=<unix-seconds>; ttl=<seconds>
//! nonce=<64 hex chars>
//! ```
//!
//! Wallets are free to re-wrap text before signing, so [`parse`] tolerates
//! CRLF line endings, surrounding whitespace, blank lines and a trailing
//! newline. It reports which style it saw so that a signature which fails to
//! recover can be diagnosed.

use ethers::types::{Address, Signature};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const BINDING_HEADER: &str = "Agent DJ Radio Wallet Binding v1";
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 120;
const NONCE_HEX_LEN: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    #[error("Invalid binding field {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// `line` is 1-based; 0 means the message as a whole.
    #[error("Malformed binding message at line {line} ({field}): {reason}")]
    Format {
        line: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Binding challenge mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: Uuid, actual: Uuid },

    #[error("Binding timestamp off by {skew_secs}s (allowed {allowed_secs}s)")]
    ClockSkew { skew_secs: i64, allowed_secs: i64 },

    #[error("Binding message expired at {expired_at}")]
    Expired { expired_at: i64 },

    #[error("Invalid binding signature: {0}")]
    Signature(String),
}

impl BindingError {
    pub fn code(&self) -> &'static str {
        match self {
            BindingError::Validation { .. } => "VALIDATION",
            BindingError::Format { .. } => "FORMAT",
            BindingError::Mismatch { .. } => "MISMATCH",
            BindingError::ClockSkew { .. } => "CLOCK_SKEW",
            BindingError::Expired { .. } => "EXPIRED",
            BindingError::Signature(_) => "SIGNATURE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    Crlf,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBinding {
    pub challenge_id: Uuid,
    pub ts: i64,
    pub ttl: i64,
    pub nonce: String,
    pub line_ending: LineEnding,
    pub trailing_newline: bool,
}

impl ParsedBinding {
    pub fn expires_at(&self) -> i64 {
        self.ts.saturating_add(self.ttl)
    }
}

/// Builds the canonical message text. A fresh CSPRNG nonce is generated when
/// `nonce` is `None`.
pub fn build(
    challenge_id: &str,
    ts: i64,
    ttl: i64,
    nonce: Option<&str>,
) -> Result<String, BindingError> {
    let challenge_id = Uuid::parse_str(challenge_id).map_err(|e| BindingError::Validation {
        field: "challengeId",
        reason: format!("not a UUID: {}", e),
    })?;
    if ts <= 0 {
        return Err(BindingError::Validation {
            field: "ts",
            reason: "must be a positive integer".to_string(),
        });
    }
    if ttl <= 0 {
        return Err(BindingError::Validation {
            field: "ttl",
            reason: "must be a positive integer".to_string(),
        });
    }
    let nonce = match nonce {
        Some(n) if is_nonce(n) => n.to_string(),
        Some(_) => {
            return Err(BindingError::Validation {
                field: "nonce",
                reason: format!("must be {} hex characters", NONCE_HEX_LEN),
            })
        }
        None => generate_nonce(),
    };

    Ok(format!(
        "{}\nchallengeId={}; ts={}; ttl={}\nnonce={}",
        BINDING_HEADER, challenge_id, ts, ttl, nonce
    ))
}

pub fn generate_nonce() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

pub fn parse(message: &str) -> Result<ParsedBinding, BindingError> {
    let line_ending = detect_line_ending(message);
    let trailing_newline = message.ends_with('\n');

    let normalized = message.replace("\r\n", "\n");
    let lines: Vec<&str> = normalized
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    if lines.len() != 3 {
        return Err(BindingError::Format {
            line: 0,
            field: "message",
            reason: format!("expected 3 lines, found {}", lines.len()),
        });
    }

    if lines[0] != BINDING_HEADER {
        return Err(BindingError::Format {
            line: 1,
            field: "header",
            reason: format!("expected \"{}\"", BINDING_HEADER),
        });
    }

    let parts: Vec<&str> = lines[1].split(';').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(BindingError::Format {
            line: 2,
            field: "fields",
            reason: format!("expected challengeId, ts and ttl, found {} fields", parts.len()),
        });
    }

    let raw_id = field_value(parts[0], "challengeId", 2)?;
    let challenge_id = Uuid::parse_str(raw_id).map_err(|_| BindingError::Format {
        line: 2,
        field: "challengeId",
        reason: "not a UUID".to_string(),
    })?;
    let ts = positive_int(field_value(parts[1], "ts", 2)?, "ts")?;
    let ttl = positive_int(field_value(parts[2], "ttl", 2)?, "ttl")?;

    let nonce = field_value(lines[2], "nonce", 3)?;
    if !is_nonce(nonce) {
        return Err(BindingError::Format {
            line: 3,
            field: "nonce",
            reason: format!("expected {} hex characters", NONCE_HEX_LEN),
        });
    }

    Ok(ParsedBinding {
        challenge_id,
        ts,
        ttl,
        nonce: nonce.to_string(),
        line_ending,
        trailing_newline,
    })
}

/// Parses `message` and checks it against the challenge being paid.
///
/// The challenge id is compared before any timing check, so a message bound
/// to another challenge is rejected even when its timestamps are fine.
pub fn validate(
    message: &str,
    expected_challenge_id: Uuid,
    now_unix: i64,
    clock_skew_secs: i64,
) -> Result<ParsedBinding, BindingError> {
    let parsed = parse(message)?;

    if parsed.challenge_id != expected_challenge_id {
        return Err(BindingError::Mismatch {
            expected: expected_challenge_id,
            actual: parsed.challenge_id,
        });
    }

    let skew = now_unix.saturating_sub(parsed.ts).saturating_abs();
    if skew > clock_skew_secs {
        return Err(BindingError::ClockSkew {
            skew_secs: skew,
            allowed_secs: clock_skew_secs,
        });
    }

    if now_unix >= parsed.expires_at() {
        return Err(BindingError::Expired {
            expired_at: parsed.expires_at(),
        });
    }

    Ok(parsed)
}

/// Recovers the wallet that produced an EIP-191 `personal_sign` signature
/// over `message`.
pub fn recover_signer(message: &str, signature: &str) -> Result<Address, BindingError> {
    let signature = Signature::from_str(signature.trim())
        .map_err(|e| BindingError::Signature(e.to_string()))?;
    signature
        .recover(message)
        .map_err(|e| BindingError::Signature(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedBinding {
    pub challenge_id: String,
    pub nonce: String,
    pub ts: i64,
    pub ttl: i64,
}

impl fmt::Display for MaskedBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "challengeId={} ts={} ttl={} nonce={}",
            self.challenge_id, self.ts, self.ttl, self.nonce
        )
    }
}

pub fn mask_for_logging(parsed: &ParsedBinding) -> MaskedBinding {
    MaskedBinding {
        challenge_id: mask(&parsed.challenge_id.to_string(), 8, 4),
        nonce: mask(&parsed.nonce, 6, 4),
        ts: parsed.ts,
        ttl: parsed.ttl,
    }
}

fn mask(value: &str, head: usize, tail: usize) -> String {
    if value.len() <= head + tail {
        return "*".repeat(value.len());
    }
    format!("{}...{}", &value[..head], &value[value.len() - tail..])
}

fn detect_line_ending(message: &str) -> LineEnding {
    let crlf = message.matches("\r\n").count();
    let lf = message.matches('\n').count();
    match (crlf, lf - crlf) {
        (0, _) => LineEnding::Lf,
        (_, 0) => LineEnding::Crlf,
        _ => LineEnding::Mixed,
    }
}

fn field_value<'a>(
    segment: &'a str,
    field: &'static str,
    line: usize,
) -> Result<&'a str, BindingError> {
    match segment.split_once('=') {
        Some((key, value)) if key.trim() == field => Ok(value.trim()),
        _ => Err(BindingError::Format {
            line,
            field,
            reason: format!("expected {}=<value>", field),
        }),
    }
}

fn positive_int(raw: &str, field: &'static str) -> Result<i64, BindingError> {
    match raw.parse::<i64>() {
        Ok(value) if value > 0 && raw.bytes().all(|b| b.is_ascii_digit()) => Ok(value),
        _ => Err(BindingError::Format {
            line: 2,
            field,
            reason: "must be a positive integer".to_string(),
        }),
    }
}

fn is_nonce(value: &str) -> bool {
    value.len() == NONCE_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

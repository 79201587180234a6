//! Interpretation of upstream `/verify` responses.
//!
//! Upstream schemas drift, so every logical field is looked up through
//! [`FIELD_ALIASES`]. Structural checks run first (JSON object, boolean
//! `verified`); semantic checks only run on a structurally valid body.

use ethers::types::{Address, H256, U256};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::models::{
    TruePayer, VerificationCode, VerificationResult, VerifiedPayment, VerifyInput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    PayTo,
    Asset,
    Chain,
    Amount,
    TxSender,
    TransferFrom,
    BlockNumber,
}

/// Accepted upstream names per logical field, in lookup order.
pub const FIELD_ALIASES: &[(Field, &[&str])] = &[
    (Field::PayTo, &["payTo", "to"]),
    (Field::Asset, &["asset", "symbol"]),
    (Field::Chain, &["chain", "network"]),
    (Field::Amount, &["amountPaid", "amount", "amountAtomic"]),
    (Field::TxSender, &["from", "sender", "payer"]),
    (Field::TransferFrom, &["transferFrom", "tokenFrom"]),
    (Field::BlockNumber, &["blockNumber", "block"]),
];

/// Network names by numeric and CAIP-2 identifiers.
const CHAIN_ALIASES: &[(&str, &[&str])] = &[
    ("base", &["8453", "eip155:8453", "base-mainnet"]),
    ("base-sepolia", &["84532", "eip155:84532"]),
    ("ethereum", &["1", "eip155:1", "mainnet", "ethereum-mainnet"]),
    ("sepolia", &["11155111", "eip155:11155111", "ethereum-sepolia"]),
];

// keccak256("Transfer(address,address,uint256)")
const TRANSFER_TOPIC: &str = "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const MAX_DETAIL_LEN: usize = 200;

fn lookup<'a>(object: &'a Map<String, Value>, field: Field) -> Option<&'a Value> {
    let (_, aliases) = FIELD_ALIASES.iter().find(|(f, _)| *f == field)?;
    aliases
        .iter()
        .filter_map(|name| object.get(*name))
        .find(|value| !value.is_null())
}

fn lookup_str<'a>(object: &'a Map<String, Value>, field: Field) -> Option<&'a str> {
    lookup(object, field).and_then(Value::as_str)
}

/// A present field as text for comparison. Numbers render in decimal;
/// any other non-string value is `Err` with its JSON rendering.
fn lookup_text(object: &Map<String, Value>, field: Field) -> Option<Result<String, String>> {
    lookup(object, field).map(|value| match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(truncate(&other.to_string())),
    })
}

pub fn normalize_chain(chain: &str) -> String {
    let chain = chain.trim().to_ascii_lowercase().replace('_', "-");
    CHAIN_ALIASES
        .iter()
        .find(|(name, aliases)| *name == chain || aliases.contains(&chain.as_str()))
        .map(|(name, _)| name.to_string())
        .unwrap_or(chain)
}

pub fn normalize_asset(asset: &str) -> String {
    asset.trim().to_ascii_uppercase()
}

pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Parses an atomic amount given either as a JSON integer or a string of
/// decimal digits.
pub fn parse_atomic(value: &Value) -> Option<U256> {
    match value {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            U256::from_dec_str(s).ok()
        }
        _ => None,
    }
}

/// Validates a 2xx response body against what the challenge requires.
pub fn interpret(body: &str, expected: &VerifyInput) -> VerificationResult {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            return VerificationResult::rejected(
                VerificationCode::ProviderError,
                "Provider response is not an object",
            )
        }
    };
    let Some(object) = value.as_object() else {
        return VerificationResult::rejected(
            VerificationCode::ProviderError,
            "Provider response is not an object",
        );
    };
    let Some(verified) = object.get("verified").and_then(Value::as_bool) else {
        return VerificationResult::rejected(
            VerificationCode::ProviderError,
            "Provider response missing verified field",
        );
    };

    if !verified {
        return rejection_from_error(object.get("error"), VerificationCode::NoMatch);
    }

    if let Some(pay_to) = lookup_text(object, Field::PayTo) {
        let matches = pay_to
            .as_deref()
            .is_ok_and(|p| normalize_address(p) == normalize_address(&expected.pay_to));
        if !matches {
            return VerificationResult::rejected_with_detail(
                VerificationCode::NoMatch,
                "Payment recipient does not match",
                format!("expected {}, got {}", expected.pay_to, shown(&pay_to)),
            );
        }
    }

    if let Some(chain) = lookup_text(object, Field::Chain) {
        let matches = chain
            .as_deref()
            .is_ok_and(|c| normalize_chain(c) == normalize_chain(&expected.chain));
        if !matches {
            return VerificationResult::rejected_with_detail(
                VerificationCode::WrongChain,
                "Payment made on the wrong chain",
                format!("expected {}, got {}", expected.chain, shown(&chain)),
            );
        }
    }

    if let Some(asset) = lookup_text(object, Field::Asset) {
        let matches = asset
            .as_deref()
            .is_ok_and(|a| normalize_asset(a) == normalize_asset(&expected.asset));
        if !matches {
            return VerificationResult::rejected_with_detail(
                VerificationCode::WrongAsset,
                "Payment made in the wrong asset",
                format!("expected {}, got {}", expected.asset, shown(&asset)),
            );
        }
    }

    let Some(raw_amount) = lookup(object, Field::Amount) else {
        return VerificationResult::rejected(
            VerificationCode::ProviderError,
            "Provider response missing paid amount",
        );
    };
    let Some(paid) = parse_atomic(raw_amount) else {
        return VerificationResult::rejected_with_detail(
            VerificationCode::ProviderError,
            "Provider response has an invalid paid amount",
            truncate(&raw_amount.to_string()),
        );
    };
    if paid < expected.amount_atomic {
        return VerificationResult::rejected_with_detail(
            VerificationCode::WrongAmount,
            "Insufficient payment",
            format!(
                "expected {} atomic units, got {}",
                expected.amount_atomic, paid
            ),
        );
    }

    let true_payer = extract_true_payer(object);
    let payer = true_payer.best_guess().map(normalize_address);
    let block_number = lookup(object, Field::BlockNumber).and_then(parse_block_number);

    VerificationResult::Verified(VerifiedPayment {
        amount_paid_atomic: paid,
        payer,
        true_payer,
        block_number,
    })
}

/// Maps a final (non-retryable) 4xx answer onto a semantic code.
pub fn interpret_client_error(status: StatusCode, body: &str) -> VerificationResult {
    let error = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").cloned());

    let fallback = match status {
        StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            VerificationCode::NoMatch
        }
        StatusCode::GONE => VerificationCode::Expired,
        _ => VerificationCode::ProviderError,
    };

    match error {
        Some(error) => rejection_from_error(Some(&error), fallback),
        None => VerificationResult::rejected_with_detail(
            fallback,
            format!("Provider rejected verification (HTTP {})", status.as_u16()),
            truncate(body.trim()),
        ),
    }
}

fn rejection_from_error(error: Option<&Value>, fallback: VerificationCode) -> VerificationResult {
    let code = error
        .and_then(|e| e.get("code"))
        .and_then(Value::as_str);
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .or_else(|| error.and_then(Value::as_str));

    let mapped = code
        .and_then(VerificationCode::from_upstream)
        .unwrap_or(fallback);

    match (code, message) {
        (_, Some(message)) => VerificationResult::rejected_with_detail(
            mapped,
            "Payment not verified by provider",
            truncate(message),
        ),
        (Some(code), None) => VerificationResult::rejected_with_detail(
            mapped,
            "Payment not verified by provider",
            truncate(code),
        ),
        (None, None) => VerificationResult::rejected(mapped, "Payment not verified by provider"),
    }
}

fn extract_true_payer(object: &Map<String, Value>) -> TruePayer {
    let transfer_from = lookup_str(object, Field::TransferFrom)
        .map(normalize_address)
        .or_else(|| transfer_log_sender(object));
    let tx_sender = lookup_str(object, Field::TxSender).map(normalize_address);
    TruePayer {
        transfer_from,
        tx_sender,
    }
}

/// `from` topic of the first ERC-20 `Transfer` log in the response, if the
/// provider included receipt logs.
fn transfer_log_sender(object: &Map<String, Value>) -> Option<String> {
    let transfer_topic = H256::from_str(TRANSFER_TOPIC).ok()?;
    object
        .get("logs")?
        .as_array()?
        .iter()
        .filter_map(|log| log.get("topics")?.as_array())
        .filter(|topics| topics.len() >= 3)
        .find_map(|topics| {
            let first = H256::from_str(topics[0].as_str()?).ok()?;
            if first != transfer_topic {
                return None;
            }
            let from = H256::from_str(topics[1].as_str()?).ok()?;
            Some(format!("{:?}", Address::from(from)))
        })
}

fn parse_block_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

fn shown(text: &Result<String, String>) -> &str {
    match text {
        Ok(s) | Err(s) => s,
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_DETAIL_LEN) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

use dj_x402::models::{VerificationCode, VerificationResult, VerifyInput};
use dj_x402::providers::{CdpVerifier, FacilitatorVerifier, PaymentVerifier, RetryPolicy};
use ethers::types::U256;
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::{Duration, Instant};
use uuid::Uuid;

const PAY_TO: &str = "0x5B38Da6a701c568545dCfcB03FcB875f56beddC4";
const PAYER: &str = "0xab8483f64d9c6d1ecf9b849ae677dd3315835cb2";
const TX: &str = "0x9f2c6b1d0d7d4e5a3b2c1d0e9f8a7b6c5d4e3f2a1b0c9d8e7f6a5b4c3d2e1f0a";

fn expected() -> VerifyInput {
    VerifyInput {
        pay_to: PAY_TO.to_string(),
        amount_atomic: U256::from(3_000_000u64),
        asset: "USDC".to_string(),
        chain: "base-sepolia".to_string(),
        challenge_id: Uuid::new_v4(),
        tx_hash: TX.to_string(),
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::from_millis(&[20, 40], 0.0).with_attempt_timeout(Duration::from_secs(2))
}

fn verified_body(amount: u64) -> String {
    json!({
        "verified": true,
        "payTo": PAY_TO,
        "asset": "USDC",
        "chain": "base-sepolia",
        "amountPaid": amount,
        "from": PAYER,
        "blockNumber": 123456,
    })
    .to_string()
}

#[tokio::test]
async fn cdp_accepts_matching_payment() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/verify")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "txHash": TX,
            "amountAtomic": "3000000",
            "chain": "base-sepolia",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(verified_body(3_000_000))
        .expect(1)
        .create_async()
        .await;

    let verifier = CdpVerifier::new(&server.url(), "test-key", fast_policy()).unwrap();
    let result = verifier.verify_payment(&expected()).await;

    mock.assert_async().await;
    let VerificationResult::Verified(payment) = result else {
        panic!("expected verified payment, got {:?}", result);
    };
    assert_eq!(payment.amount_paid_atomic, U256::from(3_000_000u64));
    assert_eq!(payment.payer.as_deref(), Some(PAYER));
    assert_eq!(payment.block_number, Some(123456));
}

#[tokio::test]
async fn short_payment_is_wrong_amount() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/verify")
        .with_status(200)
        .with_body(verified_body(2_000_000))
        .create_async()
        .await;

    let verifier = CdpVerifier::new(&server.url(), "test-key", fast_policy()).unwrap();
    let result = verifier.verify_payment(&expected()).await;

    let VerificationResult::Rejected(failure) = result else {
        panic!("expected rejection, got {:?}", result);
    };
    assert_eq!(failure.code, VerificationCode::WrongAmount);
    let detail = failure.detail.unwrap_or_default();
    assert!(detail.contains("3000000"));
    assert!(detail.contains("2000000"));
}

/// Serves 503 twice then a verified payment, and returns how long the
/// verifier took to get there.
async fn recover_after_two_outages(policy: RetryPolicy) -> Duration {
    let mut server = Server::new_async().await;
    let unavailable = server
        .mock("POST", "/verify")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/verify")
        .with_status(200)
        .with_body(verified_body(3_000_000))
        .expect(1)
        .create_async()
        .await;

    let verifier = FacilitatorVerifier::new(&server.url(), None, policy).unwrap();
    let started = Instant::now();
    let result = verifier.verify_payment(&expected()).await;
    let elapsed = started.elapsed();

    unavailable.assert_async().await;
    ok.assert_async().await;
    assert!(result.is_ok(), "{:?}", result);
    elapsed
}

// Local round trips stay well under this.
const SLACK: Duration = Duration::from_millis(400);

#[tokio::test]
async fn retries_server_errors_on_schedule() {
    let policy = RetryPolicy::from_millis(&[100, 200], 0.0);
    let elapsed = recover_after_two_outages(policy).await;

    assert!(elapsed >= Duration::from_millis(300), "slept only {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(300) + SLACK, "took {:?}", elapsed);
}

#[tokio::test]
async fn jittered_backoff_stays_within_bounds() {
    let policy = RetryPolicy::from_millis(&[100, 200], 0.25);
    let elapsed = recover_after_two_outages(policy).await;

    assert!(elapsed >= Duration::from_millis(220), "slept only {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(375) + SLACK, "took {:?}", elapsed);
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let mut server = Server::new_async().await;
    let limited = server
        .mock("POST", "/verify")
        .with_status(429)
        .expect(1)
        .create_async()
        .await;
    let ok = server
        .mock("POST", "/verify")
        .with_status(200)
        .with_body(verified_body(3_000_000))
        .expect(1)
        .create_async()
        .await;

    let verifier = FacilitatorVerifier::new(&server.url(), None, fast_policy()).unwrap();
    let result = verifier.verify_payment(&expected()).await;

    limited.assert_async().await;
    ok.assert_async().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn exhausted_retries_are_provider_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/verify")
        .with_status(502)
        .expect(3)
        .create_async()
        .await;

    let verifier = FacilitatorVerifier::new(&server.url(), None, fast_policy()).unwrap();
    let result = verifier.verify_payment(&expected()).await;

    mock.assert_async().await;
    assert_eq!(result.code(), Some(VerificationCode::ProviderError));
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/verify")
        .with_status(404)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let verifier = FacilitatorVerifier::new(&server.url(), None, fast_policy()).unwrap();
    let result = verifier.verify_payment(&expected()).await;

    mock.assert_async().await;
    assert_eq!(result.code(), Some(VerificationCode::NoMatch));
}

#[tokio::test]
async fn malformed_bodies_are_provider_errors() {
    for body in ["[1, 2, 3]", "not json", r#"{"payTo": "0x1"}"#] {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/verify")
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;

        let verifier = CdpVerifier::new(&server.url(), "test-key", fast_policy()).unwrap();
        let result = verifier.verify_payment(&expected()).await;
        assert_eq!(
            result.code(),
            Some(VerificationCode::ProviderError),
            "body {}",
            body
        );
    }
}

#[tokio::test]
async fn unreachable_upstream_is_provider_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let verifier = FacilitatorVerifier::new(&url, None, fast_policy()).unwrap();
    let result = verifier.verify_payment(&expected()).await;

    let VerificationResult::Rejected(failure) = result else {
        panic!("expected rejection");
    };
    assert_eq!(failure.code, VerificationCode::ProviderError);
    assert!(!failure.message.contains("127.0.0.1"));
    assert!(!failure.detail.unwrap_or_default().contains("127.0.0.1"));
}

#[tokio::test]
async fn facilitator_sends_token_details_and_api_key() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/verify")
        .match_header("x-api-key", "fac-key")
        .match_body(Matcher::PartialJson(json!({
            "payTo": PAY_TO,
            "tokenAddress": "0x036CbD53842c5426634e7929541eC2318f3dCF7e",
            "chainId": 84532,
        })))
        .with_status(200)
        .with_body(verified_body(3_500_000))
        .expect(1)
        .create_async()
        .await;

    let verifier = FacilitatorVerifier::new(&server.url(), Some("fac-key"), fast_policy())
        .unwrap()
        .with_token_address("0x036CbD53842c5426634e7929541eC2318f3dCF7e")
        .with_chain_id(84532);
    let result = verifier.verify_payment(&expected()).await;

    mock.assert_async().await;
    assert!(result.is_ok());
}

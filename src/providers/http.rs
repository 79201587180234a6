use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Instant;

use super::response;
use super::retry::RetryPolicy;
use crate::error::PaymentError;
use crate::models::{VerificationCode, VerificationResult, VerifyInput};

/// What the upstream finally said, once retries are over.
#[derive(Debug)]
enum Reply {
    Success(String),
    Rejected { status: StatusCode, body: String },
}

/// `POST <base>/verify` with retry, backoff and a per-attempt timeout.
///
/// Error text never includes the URL or credentials; it ends up in API
/// responses.
#[derive(Debug, Clone)]
pub struct VerifyEndpoint {
    provider: &'static str,
    client: Client,
    verify_url: String,
    headers: HeaderMap,
    policy: RetryPolicy,
}

impl VerifyEndpoint {
    pub fn new(provider: &'static str, base_url: &str, policy: RetryPolicy) -> Self {
        Self {
            provider,
            client: Client::new(),
            verify_url: format!("{}/verify", base_url.trim_end_matches('/')),
            headers: HeaderMap::new(),
            policy,
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Result<Self, PaymentError> {
        let value = HeaderValue::from_str(value).map_err(|_| {
            PaymentError::Configuration(format!("{} credential is not a valid header value", self.provider))
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    /// Posts `body` and validates the answer against `expected`. Always
    /// produces a result; transport problems become `PROVIDER_ERROR`.
    pub async fn verify(&self, body: &Value, expected: &VerifyInput) -> VerificationResult {
        let started = Instant::now();
        let result = match self.post_with_retry(body).await {
            Ok(Reply::Success(text)) => response::interpret(&text, expected),
            Ok(Reply::Rejected { status, body }) => response::interpret_client_error(status, &body),
            Err(last_error) => VerificationResult::rejected_with_detail(
                VerificationCode::ProviderError,
                format!("{} verification unavailable", self.provider),
                last_error,
            ),
        };

        tracing::info!(
            provider = self.provider,
            challenge_id = %expected.challenge_id,
            ok = result.is_ok(),
            code = ?result.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Verification finished"
        );
        result
    }

    async fn post_with_retry(&self, body: &Value) -> Result<Reply, String> {
        let mut last_error = String::from("no attempt made");

        for attempt in 0..self.policy.max_attempts() {
            match self.attempt(body).await {
                Ok(reply) => return Ok(reply),
                Err(reason) => {
                    tracing::warn!(
                        provider = self.provider,
                        attempt = attempt + 1,
                        "Verification attempt failed: {}",
                        reason
                    );
                    last_error = reason;
                }
            }

            if let Some(delay) = self.policy.backoff_after(attempt) {
                tracing::debug!(
                    provider = self.provider,
                    "Retrying in {}ms",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error)
    }

    /// One request. `Err` means the attempt may be retried.
    async fn attempt(&self, body: &Value) -> Result<Reply, String> {
        let response = self
            .client
            .post(&self.verify_url)
            .headers(self.headers.clone())
            .json(body)
            .timeout(self.policy.attempt_timeout())
            .send()
            .await
            .map_err(|e| self.describe(&e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(format!("upstream returned HTTP {}", status.as_u16()));
        }

        let text = response.text().await.map_err(|e| self.describe(&e))?;
        if status.is_success() {
            Ok(Reply::Success(text))
        } else {
            Ok(Reply::Rejected { status, body: text })
        }
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            format!(
                "upstream timed out after {}ms",
                self.policy.attempt_timeout().as_millis()
            )
        } else if err.is_connect() {
            "could not connect to upstream".to_string()
        } else if err.is_body() || err.is_decode() {
            "failed to read upstream response".to_string()
        } else {
            "upstream request failed".to_string()
        }
    }
}

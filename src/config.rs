use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::providers::RetryPolicy;
use crate::services::binding::DEFAULT_CLOCK_SKEW_SECS;
use crate::services::challenge::{ChallengeSettings, DEFAULT_CHALLENGE_TTL_SECS};

#[derive(Debug, Clone)]
pub enum Environment {
    Development,
    Testnet,
    Production,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    Cdp {
        api_url: String,
        api_key: String,
    },
    Facilitator {
        url: String,
        api_key: Option<String>,
    },
}

impl ProviderConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderConfig::Cdp { .. } => "cdp",
            ProviderConfig::Facilitator { .. } => "facilitator",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub host: String,
    pub port: u16,

    // Storage; memory-only when unset
    pub redis_url: Option<String>,

    // Upstream verification
    pub provider: ProviderConfig,
    pub provider_timeout: Duration,

    // Payment terms
    pub pay_to: Option<String>,
    pub asset: String,
    pub chain: String,
    pub asset_decimals: u32,
    pub token_address: Option<String>,
    pub chain_id: Option<u64>,
    pub challenge_ttl_secs: i64,
    pub clock_skew_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let environment = Self::parse_environment()?;

        let config = Self {
            environment,
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_var("PORT", "8080")?,

            redis_url: Self::optional("REDIS_URL"),

            provider: Self::parse_provider()?,
            provider_timeout: Duration::from_millis(Self::parse_var("PROVIDER_TIMEOUT_MS", "10000")?),

            pay_to: Self::optional("X402_PAY_TO"),
            asset: std::env::var("X402_ASSET").unwrap_or_else(|_| "USDC".to_string()),
            chain: std::env::var("X402_CHAIN").unwrap_or_else(|_| "base-sepolia".to_string()),
            asset_decimals: Self::parse_var("X402_ASSET_DECIMALS", "6")?,
            token_address: Self::optional("X402_TOKEN_ADDRESS"),
            chain_id: Self::optional("X402_CHAIN_ID")
                .map(|v| v.parse().context("Invalid X402_CHAIN_ID"))
                .transpose()?,
            challenge_ttl_secs: Self::parse_var(
                "X402_CHALLENGE_TTL_SECS",
                &DEFAULT_CHALLENGE_TTL_SECS.to_string(),
            )?,
            clock_skew_secs: Self::parse_var(
                "BINDING_CLOCK_SKEW_SECS",
                &DEFAULT_CLOCK_SKEW_SECS.to_string(),
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn challenge_settings(&self) -> ChallengeSettings {
        ChallengeSettings {
            pay_to: self.pay_to.clone(),
            asset: self.asset.clone(),
            chain: self.chain.clone(),
            asset_decimals: self.asset_decimals,
            ttl: chrono::Duration::seconds(self.challenge_ttl_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = match self.provider {
            ProviderConfig::Cdp { .. } => RetryPolicy::cdp(),
            ProviderConfig::Facilitator { .. } => RetryPolicy::facilitator(),
        };
        policy.with_attempt_timeout(self.provider_timeout)
    }

    fn parse_environment() -> Result<Environment> {
        let env = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        match env.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "testnet" | "test" => Ok(Environment::Testnet),
            "production" | "prod" => Ok(Environment::Production),
            _ => bail!("Unknown environment: {}", env),
        }
    }

    fn parse_provider() -> Result<ProviderConfig> {
        let kind = std::env::var("PAYMENT_PROVIDER").unwrap_or_else(|_| "facilitator".to_string());

        match kind.to_lowercase().as_str() {
            "cdp" => Ok(ProviderConfig::Cdp {
                api_url: std::env::var("CDP_API_URL").context("CDP_API_URL required")?,
                api_key: std::env::var("CDP_API_KEY").context("CDP_API_KEY required")?,
            }),
            "facilitator" => Ok(ProviderConfig::Facilitator {
                url: std::env::var("FACILITATOR_URL").context("FACILITATOR_URL required")?,
                api_key: Self::optional("FACILITATOR_API_KEY"),
            }),
            _ => bail!("Unknown PAYMENT_PROVIDER: {}", kind),
        }
    }

    fn parse_var<T>(var: &str, default: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        std::env::var(var)
            .unwrap_or_else(|_| default.to_string())
            .parse()
            .with_context(|| format!("Invalid {}", var))
    }

    fn optional(var: &str) -> Option<String> {
        std::env::var(var).ok().filter(|v| !v.trim().is_empty())
    }

    fn validate(&self) -> Result<()> {
        let url = match &self.provider {
            ProviderConfig::Cdp { api_url, .. } => api_url,
            ProviderConfig::Facilitator { url, .. } => url,
        };
        if !url.starts_with("http") {
            bail!("{} provider URL must be HTTP(S) URL", self.provider.name());
        }

        if self.challenge_ttl_secs <= 0 {
            bail!("X402_CHALLENGE_TTL_SECS must be positive");
        }
        if self.clock_skew_secs < 0 {
            bail!("BINDING_CLOCK_SKEW_SECS must not be negative");
        }
        if self.asset_decimals > 18 {
            bail!("X402_ASSET_DECIMALS must be at most 18");
        }

        if self.pay_to.is_none() {
            tracing::warn!("X402_PAY_TO is not set; challenge creation will fail");
        }

        tracing::info!(
            "Configuration validated for {:?} environment (provider: {})",
            self.environment,
            self.provider.name()
        );

        Ok(())
    }
}

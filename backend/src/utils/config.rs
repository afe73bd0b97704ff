use anyhow::Result;
use chrono_tz::Tz;
use std::env;
use std::time::Duration;
use crate::constants::*;

#[derive(Debug, Clone)]
pub struct Config {
    pub primary_rpc_url: String,
    pub secondary_rpc_url: Option<String>,
    pub tip_contract_address: String,
    pub sentiment_api_url: Option<String>,
    pub database_url: Option<String>,
    pub port: u16,
    pub display_timezone: Tz,
    pub sentiment_concurrency: usize,
    pub sentiment_timeout: Duration,
    pub rpc_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let tip_contract_address = env::var("TIP_CONTRACT_ADDRESS")
            .map_err(|_| anyhow::anyhow!("TIP_CONTRACT_ADDRESS must be set"))?
            .to_lowercase();
        if !is_valid_ethereum_address(&tip_contract_address) {
            return Err(anyhow::anyhow!(
                "TIP_CONTRACT_ADDRESS is not a valid address: {}",
                tip_contract_address
            ));
        }

        let display_timezone = match optional_var("DISPLAY_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("Invalid DISPLAY_TIMEZONE '{}': {}", name, e))?,
            None => Tz::UTC,
        };

        Ok(Self {
            primary_rpc_url: env::var("PRIMARY_RPC_URL")
                .map_err(|_| anyhow::anyhow!("PRIMARY_RPC_URL must be set"))?,
            secondary_rpc_url: optional_var("SECONDARY_RPC_URL"),
            tip_contract_address,
            sentiment_api_url: optional_var("SENTIMENT_API_URL"),
            database_url: optional_var("DATABASE_URL"),
            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .unwrap_or(DEFAULT_SERVER_PORT),
            display_timezone,
            sentiment_concurrency: env::var("SENTIMENT_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_SENTIMENT_CONCURRENCY),
            sentiment_timeout: Duration::from_millis(
                env::var("SENTIMENT_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_SENTIMENT_TIMEOUT_MS),
            ),
            rpc_timeout: Duration::from_secs(
                env::var("RPC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RPC_TIMEOUT_SECS),
            ),
        })
    }
}

/// Reads a variable, treating unset and blank the same way
fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

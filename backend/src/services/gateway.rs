use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use crate::error::GatewayError;
use crate::utils::token_conversion::parse_hex_u64;

/// Vendor free-tier range caps and generic throttling responses
static RATE_LIMIT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+\s*block range|block range (limit|too large|exceeded)|rate.?limit|too many requests|exceeded .*(capacity|quota)|free tier)")
        .expect("rate limit pattern is valid")
});

/// Nodes that are still building their historical log index
static STILL_INDEXING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(still indexing|indexing (is )?in progress|not (yet )?(been )?indexed|index (is )?not (yet )?(ready|available))")
        .expect("indexing pattern is valid")
});

/// JSON-RPC "limit exceeded" code used by several providers
const LIMIT_EXCEEDED_CODE: i64 = -32005;

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Maps a node's error prose onto the gateway taxonomy
pub fn classify_node_error(message: &str) -> GatewayError {
    if RATE_LIMIT_PATTERN.is_match(message) {
        GatewayError::RateLimited(message.to_string())
    } else if STILL_INDEXING_PATTERN.is_match(message) {
        GatewayError::StillIndexing(message.to_string())
    } else {
        GatewayError::Protocol(message.to_string())
    }
}

/// JSON-RPC client with a single fallback hop from the primary to the secondary node.
#[derive(Debug, Clone)]
pub struct ChainGateway {
    client: Client,
    primary_url: String,
    secondary_url: Option<String>,
}

impl ChainGateway {
    pub fn new(primary_url: String, secondary_url: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build RPC client: {}", e))?;

        Ok(Self {
            client,
            primary_url,
            secondary_url,
        })
    }

    /// Issue `method` against the primary node, retrying once on the secondary.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let primary_err = match self.call_endpoint(&self.primary_url, method, &params).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let Some(secondary_url) = &self.secondary_url else {
            tracing::error!(method, kind = primary_err.kind(), "RPC call failed with no fallback configured: {}", primary_err);
            return Err(primary_err);
        };

        tracing::warn!(method, kind = primary_err.kind(), "Primary RPC failed: {}, falling back to secondary", primary_err);

        match self.call_endpoint(secondary_url, method, &params).await {
            Ok(result) => Ok(result),
            Err(secondary_err) => {
                tracing::error!(
                    method,
                    primary = primary_err.kind(),
                    secondary = secondary_err.kind(),
                    "Both RPC endpoints failed: {}",
                    secondary_err
                );
                // Prefer whichever endpoint told us something specific
                if !secondary_err.is_classified() && primary_err.is_classified() {
                    Err(primary_err)
                } else {
                    Err(secondary_err)
                }
            }
        }
    }

    async fn call_endpoint(&self, url: &str, method: &str, params: &Value) -> Result<Value, GatewayError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(GatewayError::RateLimited(format!("HTTP {}: {}", status, body)));
            }
            return Err(match classify_node_error(&body) {
                GatewayError::Protocol(_) => GatewayError::Transport(format!("HTTP {}", status)),
                classified => classified,
            });
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::Protocol(format!("Invalid JSON-RPC response: {}", e)))?;

        if let Some(error) = envelope.error {
            if error.code == LIMIT_EXCEEDED_CODE {
                return Err(GatewayError::RateLimited(error.message));
            }
            return Err(classify_node_error(&error.message));
        }

        Ok(envelope.result)
    }

    pub async fn block_number(&self) -> Result<u64, GatewayError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| GatewayError::Protocol(format!("Unexpected eth_blockNumber result: {}", result)))?;
        parse_hex_u64(hex).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    pub async fn block_timestamp(&self, block_number: u64) -> Result<u64, GatewayError> {
        let result = self
            .call("eth_getBlockByNumber", json!([format!("0x{:x}", block_number), false]))
            .await?;
        let hex = result
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Protocol(format!("Block {} not found or missing timestamp", block_number)))?;
        parse_hex_u64(hex).map_err(|e| GatewayError::Protocol(e.to_string()))
    }

    pub async fn get_logs(&self, filter: Value) -> Result<Vec<Value>, GatewayError> {
        let result = self.call("eth_getLogs", json!([filter])).await?;
        match result {
            Value::Array(logs) => Ok(logs),
            other => Err(GatewayError::Protocol(format!("Unexpected eth_getLogs result: {}", other))),
        }
    }
}

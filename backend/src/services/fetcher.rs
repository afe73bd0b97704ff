use alloy::primitives::B256;
use alloy::sol_types::SolEvent;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use crate::error::{AnalyticsError, GatewayError};
use crate::models::{Period, TipEvent};
use crate::services::gateway::ChainGateway;
use crate::utils::token_conversion::{parse_hex_u256, parse_hex_u64, topic_to_address};

alloy::sol! {
    #[derive(Debug, PartialEq, Eq)]
    event Tipped(address indexed sender, uint256 amount);
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTipLog {
    topics: Vec<String>,
    #[serde(default)]
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
    #[serde(default)]
    removed: bool,
}

/// Result of one log query.
///
/// An empty `events` list with `error` set means the activity is unknown, not zero.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub events: Vec<TipEvent>,
    pub error: Option<GatewayError>,
}

#[derive(Debug, Clone)]
pub struct TipFetcher {
    gateway: ChainGateway,
    contract_address: String,
}

impl TipFetcher {
    pub fn new(gateway: ChainGateway, contract_address: String) -> Self {
        Self {
            gateway,
            contract_address: contract_address.to_lowercase(),
        }
    }

    pub fn gateway(&self) -> &ChainGateway {
        &self.gateway
    }

    /// Retrieve `Tipped` logs for the period ending at `latest_block`, newest first.
    pub async fn fetch_tips(
        &self,
        period: Period,
        latest_block: u64,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, AnalyticsError> {
        let from_block = from_block_for(period, latest_block);
        let filter = json!({
            "address": self.contract_address,
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": "latest",
            "topics": [tipped_topic()],
        });

        tracing::info!(%period, from_block, latest_block, "Fetching tip logs");

        let logs = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalyticsError::Cancelled),
            logs = self.gateway.get_logs(filter) => logs,
        };

        let logs = match logs {
            Ok(logs) => logs,
            Err(e) => {
                tracing::error!(%period, kind = e.kind(), "Failed to fetch tip logs: {}", e);
                return Ok(FetchOutcome {
                    events: Vec::new(),
                    error: Some(e),
                });
            }
        };

        let mut events = Vec::with_capacity(logs.len());
        for raw in &logs {
            match parse_tip_log(raw) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping malformed tip log: {}", e),
            }
        }

        // Stable, so same-block logs keep the node's log-index order
        events.sort_by(|a, b| b.block_number.cmp(&a.block_number));

        tracing::info!(%period, count = events.len(), "Fetched tip events");
        Ok(FetchOutcome { events, error: None })
    }
}

/// First block of the window; "all" is bounded by the span ceiling like every other period
pub fn from_block_for(period: Period, latest_block: u64) -> u64 {
    latest_block.saturating_sub(period.lookback_blocks())
}

pub fn tipped_topic() -> String {
    format!("{:#x}", Tipped::SIGNATURE_HASH)
}

/// Decode one raw `eth_getLogs` entry. Returns `Ok(None)` for logs dropped by a reorg.
pub fn parse_tip_log(raw: &Value) -> Result<Option<TipEvent>> {
    let log: RawTipLog = serde_json::from_value(raw.clone())
        .map_err(|e| anyhow::anyhow!("Invalid log shape: {}", e))?;
    if log.removed {
        return Ok(None);
    }

    // Tipped(address indexed sender, uint256 amount)
    if log.topics.len() < 2 {
        return Err(anyhow::anyhow!("Invalid Tipped event: expected 2 topics, got {}", log.topics.len()));
    }
    let topic0: B256 = log.topics[0]
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid event topic '{}': {}", log.topics[0], e))?;
    if topic0 != Tipped::SIGNATURE_HASH {
        return Err(anyhow::anyhow!("Unexpected event topic {}", log.topics[0]));
    }

    let sender = topic_to_address(&log.topics[1])?;
    let amount = parse_hex_u256(&log.data)?;
    let block_number = log
        .block_number
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("Missing block number"))
        .and_then(parse_hex_u64)?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| anyhow::anyhow!("Missing transaction hash"))?
        .to_lowercase();

    Ok(Some(TipEvent {
        sender,
        amount,
        block_number,
        transaction_hash,
        timestamp: None,
    }))
}

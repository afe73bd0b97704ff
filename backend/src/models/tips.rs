use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::constants::*;
use crate::utils::token_conversion::u256_decimal;

/// Reporting window selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
    All,
}

impl Period {
    /// Blocks to look back from the chain head when building the log filter.
    ///
    /// No period spans more than [`MAX_ALL_PERIOD_SPAN_BLOCKS`], and "all" always spans the most.
    pub fn lookback_blocks(self) -> u64 {
        let lookback = match self {
            Period::Day => DAY_LOOKBACK_BLOCKS,
            Period::Week => WEEK_LOOKBACK_BLOCKS,
            Period::Month => MONTH_LOOKBACK_BLOCKS,
            Period::All => MAX_ALL_PERIOD_SPAN_BLOCKS,
        };
        lookback.min(MAX_ALL_PERIOD_SPAN_BLOCKS)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
            Period::All => "all",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "all" => Ok(Period::All),
            other => Err(format!("Unsupported period: {}", other)),
        }
    }
}

/// One decoded `Tipped` log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipEvent {
    /// Lower-cased sender address
    pub sender: String,
    /// Amount in the token's smallest unit
    #[serde(with = "u256_decimal")]
    pub amount: U256,
    pub block_number: u64,
    /// Lower-cased transaction hash
    pub transaction_hash: String,
    /// Unix seconds, `None` until resolved
    #[serde(with = "optional_iso8601")]
    pub timestamp: Option<u64>,
}

impl TipEvent {
    /// Copy of the event carrying the timestamp recorded for its block.
    /// The unresolved sentinel becomes `None`.
    pub fn with_block_timestamp(&self, timestamp: u64) -> Self {
        Self {
            timestamp: (timestamp != UNRESOLVED_TIMESTAMP).then_some(timestamp),
            ..self.clone()
        }
    }
}

/// Aggregated amount for one time slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    /// `HH:MM` for intraday slots, `YYYY-MM-DD` for daily slots
    pub key: String,
    #[serde(with = "u256_decimal")]
    pub amount_sum: U256,
    pub tip_count: usize,
}

impl TimeBucket {
    pub fn empty(key: String) -> Self {
        Self { key, amount_sum: U256::ZERO, tip_count: 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub address: String,
    #[serde(with = "u256_decimal")]
    pub total: U256,
    pub tip_count: usize,
}

/// Serializes optional unix seconds as RFC 3339 strings (or null).
pub mod optional_iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value.and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0)) {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| {
            let dt = DateTime::parse_from_rfc3339(&s).map_err(D::Error::custom)?;
            u64::try_from(dt.timestamp())
                .map_err(|_| D::Error::custom(format!("timestamp before the unix epoch: {}", s)))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_parsing() {
        assert_eq!("day".parse::<Period>().unwrap(), Period::Day);
        assert_eq!(" WEEK ".parse::<Period>().unwrap(), Period::Week);
        assert_eq!("All".parse::<Period>().unwrap(), Period::All);
        assert!("year".parse::<Period>().is_err());
    }

    #[test]
    fn test_sentinel_becomes_unresolved() {
        let event = TipEvent {
            sender: "0xabc".to_string(),
            amount: U256::from(1u64),
            block_number: 7,
            transaction_hash: "0xdead".to_string(),
            timestamp: None,
        };
        assert_eq!(event.with_block_timestamp(0).timestamp, None);
        assert_eq!(event.with_block_timestamp(1_700_000_000).timestamp, Some(1_700_000_000));
    }

    #[test]
    fn test_event_serializes_amount_as_string_and_time_as_iso() {
        let event = TipEvent {
            sender: "0xabc".to_string(),
            amount: U256::from_str_radix("123456789012345678901234567890", 10).unwrap(),
            block_number: 7,
            transaction_hash: "0xdead".to_string(),
            timestamp: Some(1_700_000_000),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["amount"], "123456789012345678901234567890");
        assert_eq!(json["timestamp"], "2023-11-14T22:13:20+00:00");

        let unresolved = TipEvent { timestamp: None, ..event.clone() };
        let json = serde_json::to_value(&unresolved).unwrap();
        assert!(json["timestamp"].is_null());

        let back: TipEvent = serde_json::from_value(serde_json::to_value(&event).unwrap()).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_pre_epoch_timestamp_is_rejected() {
        let raw = serde_json::json!({
            "sender": "0xabc",
            "amount": "1",
            "block_number": 7,
            "transaction_hash": "0xdead",
            "timestamp": "1969-12-31T23:59:59+00:00"
        });
        let err = serde_json::from_value::<TipEvent>(raw).unwrap_err();
        assert!(err.to_string().contains("before the unix epoch"));
    }

    #[test]
    fn test_all_spans_at_least_every_period() {
        for period in [Period::Day, Period::Week, Period::Month, Period::All] {
            assert!(period.lookback_blocks() <= MAX_ALL_PERIOD_SPAN_BLOCKS);
            assert!(Period::All.lookback_blocks() >= period.lookback_blocks());
        }
        assert_eq!(Period::Day.lookback_blocks(), DAY_LOOKBACK_BLOCKS);
        assert_eq!(Period::Week.lookback_blocks(), WEEK_LOOKBACK_BLOCKS);
        assert_eq!(Period::Month.lookback_blocks(), MAX_ALL_PERIOD_SPAN_BLOCKS);
    }
}

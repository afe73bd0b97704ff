use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use crate::constants::*;
use crate::utils::token_conversion::u256_decimal;

/// Declaration order is the majority tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Neutral,
    Negative,
}

/// Result of analyzing a single tip message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub score: u8,
    pub label: SentimentLabel,
    pub keywords: Vec<String>,
}

impl SentimentAnalysis {
    pub fn neutral() -> Self {
        Self {
            score: NEUTRAL_SENTIMENT_SCORE,
            label: SentimentLabel::Neutral,
            keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeatLevel {
    Frenzied,
    HighValue,
    Active,
    Light,
}

impl HeatLevel {
    pub fn from_score(score: u32) -> Self {
        if score >= FRENZIED_THRESHOLD {
            HeatLevel::Frenzied
        } else if score >= HIGH_VALUE_THRESHOLD {
            HeatLevel::HighValue
        } else if score >= ACTIVE_THRESHOLD {
            HeatLevel::Active
        } else {
            HeatLevel::Light
        }
    }
}

/// Per-sender engagement profile, rebuilt on every analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContributionProfile {
    pub address: String,
    pub display_name: Option<String>,
    #[serde(with = "u256_decimal")]
    pub total_amount: U256,
    pub tip_count: usize,
    pub message_count: usize,
    pub sentiment_score: u8,
    pub sentiment_label: SentimentLabel,
    pub keywords: Vec<String>,
    pub heat_score: u32,
    pub heat_level: HeatLevel,
    /// RFC 3339, empty when none of the sender's blocks resolved
    pub first_tip_date: String,
    pub last_tip_date: String,
    /// 1-based rank by total amount
    pub amount_rank: usize,
}

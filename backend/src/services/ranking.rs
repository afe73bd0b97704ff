use alloy::primitives::U256;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use crate::models::{LeaderboardEntry, TipEvent};

/// Total order used everywhere senders are ranked: amount descending, then address ascending
pub fn compare_by_amount(a_total: &U256, a_address: &str, b_total: &U256, b_address: &str) -> Ordering {
    b_total.cmp(a_total).then_with(|| a_address.cmp(b_address))
}

/// Top `top_n` senders by summed amount.
pub fn rank(events: &[TipEvent], top_n: usize) -> Vec<LeaderboardEntry> {
    let mut totals: HashMap<String, LeaderboardEntry> = HashMap::new();
    for event in events {
        let address = event.sender.to_lowercase();
        let entry = totals.entry(address.clone()).or_insert_with(|| LeaderboardEntry {
            address,
            total: U256::ZERO,
            tip_count: 0,
        });
        entry.total = entry.total.saturating_add(event.amount);
        entry.tip_count += 1;
    }

    let mut leaderboard: Vec<LeaderboardEntry> = totals.into_values().collect();
    leaderboard.sort_by(|a, b| compare_by_amount(&a.total, &a.address, &b.total, &b.address));
    leaderboard.truncate(top_n);
    leaderboard
}

/// Number of distinct senders
pub fn unique_participants(events: &[TipEvent]) -> usize {
    events
        .iter()
        .map(|event| event.sender.to_lowercase())
        .collect::<HashSet<_>>()
        .len()
}

/// Sum of every amount in `events`
pub fn total_amount(events: &[TipEvent]) -> U256 {
    events
        .iter()
        .fold(U256::ZERO, |sum, event| sum.saturating_add(event.amount))
}

use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::constants::*;
use crate::error::AnalyticsError;
use crate::models::{HeatLevel, SentimentAnalysis, SentimentLabel, TipEvent, UserContributionProfile};
use crate::services::annotations::AnnotationLookup;
use crate::services::ranking::compare_by_amount;
use crate::services::sentiment::SentimentService;
use crate::utils::token_conversion::to_whole_tokens;

/// Composite engagement score in `[0, 1000]`.
///
/// The amount component counts whole tokens (fraction truncated) per ten, so 35.9 tokens
/// contribute 3 points.
pub fn heat_score(total_amount: U256, tip_count: usize, avg_sentiment: f64) -> u32 {
    let amount_points = to_whole_tokens(total_amount, TOKEN_DECIMALS) / U256::from(WHOLE_TOKENS_PER_AMOUNT_POINT);
    let amount_score = amount_points.min(U256::from(MAX_AMOUNT_SCORE)).to::<u64>();

    let frequency_score = (tip_count as u64)
        .saturating_mul(FREQUENCY_POINTS_PER_TIP)
        .min(MAX_FREQUENCY_SCORE);

    let sentiment = if avg_sentiment.is_nan() { 0.0 } else { avg_sentiment.clamp(0.0, 100.0) };
    let sentiment_score = (sentiment / 100.0 * SENTIMENT_WEIGHT).round() as u64;

    (amount_score + frequency_score + sentiment_score) as u32
}

/// Reported each time every message of one sender has been analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatProgress {
    pub address: String,
    pub completed: usize,
    pub total: usize,
}

struct SenderGroup<'a> {
    address: String,
    events: Vec<&'a TipEvent>,
    messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HeatScoreEngine {
    concurrency: usize,
    call_timeout: Duration,
}

impl Default for HeatScoreEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_SENTIMENT_CONCURRENCY,
            Duration::from_millis(DEFAULT_SENTIMENT_TIMEOUT_MS),
        )
    }
}

impl HeatScoreEngine {
    pub fn new(concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    /// Build one profile per sender, ordered by heat score (hottest first).
    ///
    /// Sentiment calls run on a bounded pool; a call that fails or exceeds the per-call
    /// timeout counts as neutral. `amount_rank` reflects the amount ordering independently.
    pub async fn compute_heat<F>(
        &self,
        events: &[TipEvent],
        annotations: &dyn AnnotationLookup,
        sentiment: &dyn SentimentService,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<Vec<UserContributionProfile>, AnalyticsError>
    where
        F: FnMut(HeatProgress) + Send,
    {
        let groups = group_by_sender(events, annotations);
        let total = groups.len();
        let mut completed = 0;

        let mut analyses: Vec<Vec<Option<SentimentAnalysis>>> =
            groups.iter().map(|g| vec![None; g.messages.len()]).collect();
        let mut remaining: Vec<usize> = groups.iter().map(|g| g.messages.len()).collect();

        for group in groups.iter().filter(|g| g.messages.is_empty()) {
            completed += 1;
            on_progress(HeatProgress {
                address: group.address.clone(),
                completed,
                total,
            });
        }

        // Owned messages keep the fan-out future free of borrows into `groups`
        let mut jobs: Vec<(usize, usize, String)> = Vec::new();
        for (sender_idx, group) in groups.iter().enumerate() {
            for (message_idx, message) in group.messages.iter().enumerate() {
                jobs.push((sender_idx, message_idx, message.clone()));
            }
        }

        let call_timeout = self.call_timeout;
        let mut results = std::pin::pin!(
            futures::stream::iter(jobs)
                .map(|(sender_idx, message_idx, message)| async move {
                    let analysis = match tokio::time::timeout(call_timeout, sentiment.analyze(&message)).await {
                        Ok(analysis) => analysis,
                        Err(_) => {
                            tracing::warn!(timeout_ms = call_timeout.as_millis() as u64, "Sentiment call timed out, scoring as neutral");
                            SentimentAnalysis::neutral()
                        }
                    };
                    (sender_idx, message_idx, analysis)
                })
                .buffer_unordered(self.concurrency)
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalyticsError::Cancelled),
                next = results.next() => next,
            };
            let Some((sender_idx, message_idx, analysis)) = next else {
                break;
            };

            analyses[sender_idx][message_idx] = Some(analysis);
            remaining[sender_idx] -= 1;
            if remaining[sender_idx] == 0 {
                completed += 1;
                on_progress(HeatProgress {
                    address: groups[sender_idx].address.clone(),
                    completed,
                    total,
                });
            }
        }

        let mut profiles: Vec<UserContributionProfile> = groups
            .iter()
            .zip(analyses)
            .map(|(group, analyses)| {
                let analyses: Vec<SentimentAnalysis> = analyses
                    .into_iter()
                    .map(|a| a.unwrap_or_else(SentimentAnalysis::neutral))
                    .collect();
                build_profile(group, &analyses, annotations)
            })
            .collect();

        assign_amount_ranks(&mut profiles);
        profiles.sort_by(|a, b| {
            b.heat_score
                .cmp(&a.heat_score)
                .then_with(|| a.amount_rank.cmp(&b.amount_rank))
        });

        tracing::info!(profiles = profiles.len(), "Heat profiles computed");
        Ok(profiles)
    }
}

/// Senders in first-seen order with their events and non-empty messages
fn group_by_sender<'a>(events: &'a [TipEvent], annotations: &dyn AnnotationLookup) -> Vec<SenderGroup<'a>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<SenderGroup<'a>> = Vec::new();

    for event in events {
        let address = event.sender.to_lowercase();
        let idx = *index.entry(address.clone()).or_insert_with(|| {
            groups.push(SenderGroup {
                address: address.clone(),
                events: Vec::new(),
                messages: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[idx];
        group.events.push(event);
        if let Some(message) = annotations.message(&address, &event.transaction_hash) {
            if !message.trim().is_empty() {
                group.messages.push(message);
            }
        }
    }

    groups
}

fn build_profile(
    group: &SenderGroup<'_>,
    analyses: &[SentimentAnalysis],
    annotations: &dyn AnnotationLookup,
) -> UserContributionProfile {
    let total_amount = group
        .events
        .iter()
        .fold(U256::ZERO, |sum, event| sum.saturating_add(event.amount));
    let tip_count = group.events.len();

    let sentiment_score = average_score(analyses);
    let heat_score = heat_score(total_amount, tip_count, sentiment_score as f64);

    let resolved = group.events.iter().filter_map(|event| event.timestamp);
    let first = resolved.clone().min();
    let last = resolved.max();

    UserContributionProfile {
        address: group.address.clone(),
        display_name: annotations.display_name(&group.address),
        total_amount,
        tip_count,
        message_count: group.messages.len(),
        sentiment_score,
        sentiment_label: majority_label(analyses),
        keywords: top_keywords(analyses, MAX_PROFILE_KEYWORDS),
        heat_score,
        heat_level: HeatLevel::from_score(heat_score),
        first_tip_date: iso_date(first),
        last_tip_date: iso_date(last),
        amount_rank: 0,
    }
}

/// Mean score rounded to an integer; neutral when there is nothing to average
fn average_score(analyses: &[SentimentAnalysis]) -> u8 {
    if analyses.is_empty() {
        return NEUTRAL_SENTIMENT_SCORE;
    }
    let sum: u64 = analyses.iter().map(|a| a.score as u64).sum();
    (sum as f64 / analyses.len() as f64).round() as u8
}

/// Most frequent label; ties resolve in declaration order (positive, neutral, negative)
fn majority_label(analyses: &[SentimentAnalysis]) -> SentimentLabel {
    let count = |label: SentimentLabel| analyses.iter().filter(|a| a.label == label).count();

    let mut best = SentimentLabel::Neutral;
    let mut best_count = 0;
    for label in [SentimentLabel::Positive, SentimentLabel::Neutral, SentimentLabel::Negative] {
        let n = count(label);
        if n > best_count {
            best = label;
            best_count = n;
        }
    }
    best
}

/// Up to `limit` keywords by frequency, first-seen order breaking ties
fn top_keywords(analyses: &[SentimentAnalysis], limit: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut seen = 0;
    for keyword in analyses.iter().flat_map(|a| a.keywords.iter()) {
        let entry = counts.entry(keyword.as_str()).or_insert_with(|| {
            seen += 1;
            (0, seen)
        });
        entry.0 += 1;
    }

    let mut ranked: Vec<(&str, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (a_count, a_first)), (_, (b_count, b_first))| {
        b_count.cmp(a_count).then_with(|| a_first.cmp(b_first))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(keyword, _)| keyword.to_string())
        .collect()
}

fn assign_amount_ranks(profiles: &mut [UserContributionProfile]) {
    let mut order: Vec<usize> = (0..profiles.len()).collect();
    order.sort_by(|&a, &b| {
        compare_by_amount(
            &profiles[a].total_amount,
            &profiles[a].address,
            &profiles[b].total_amount,
            &profiles[b].address,
        )
    });
    for (rank, idx) in order.into_iter().enumerate() {
        profiles[idx].amount_rank = rank + 1;
    }
}

fn iso_date(timestamp: Option<u64>) -> String {
    timestamp
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::annotations::InMemoryAnnotations;
    use crate::services::sentiment::NeutralSentiment;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ONE_TOKEN: u128 = 1_000_000_000_000_000_000;

    fn tip(sender: &str, tokens: u128, tx: &str, timestamp: Option<u64>) -> TipEvent {
        TipEvent {
            sender: sender.to_string(),
            amount: U256::from(tokens * ONE_TOKEN),
            block_number: 1,
            transaction_hash: tx.to_string(),
            timestamp,
        }
    }

    /// Scores messages by a fixed table; "slow" never answers and "fail" behaves like an
    /// unavailable service.
    struct ScriptedSentiment {
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSentiment {
        fn new() -> Self {
            Self { calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl SentimentService for ScriptedSentiment {
        async fn analyze(&self, message: &str) -> SentimentAnalysis {
            self.calls.lock().unwrap().push(message.to_string());
            match message {
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    SentimentAnalysis::neutral()
                }
                "fail" => SentimentAnalysis::neutral(),
                "love" => SentimentAnalysis {
                    score: 100,
                    label: SentimentLabel::Positive,
                    keywords: vec!["love".into(), "stream".into()],
                },
                "good" => SentimentAnalysis {
                    score: 80,
                    label: SentimentLabel::Positive,
                    keywords: vec!["stream".into(), "good".into()],
                },
                "bad" => SentimentAnalysis {
                    score: 0,
                    label: SentimentLabel::Negative,
                    keywords: vec!["bad".into()],
                },
                _ => SentimentAnalysis::neutral(),
            }
        }
    }

    #[test]
    fn test_score_formula_components() {
        let ten_tokens = U256::from(10 * ONE_TOKEN);
        assert_eq!(heat_score(U256::ZERO, 0, 0.0), 0);
        assert_eq!(heat_score(ten_tokens, 0, 0.0), 1);
        assert_eq!(heat_score(U256::ZERO, 7, 0.0), 70);
        assert_eq!(heat_score(U256::ZERO, 0, 50.0), 150);
        assert_eq!(heat_score(U256::ZERO, 0, 33.0), 99);
    }

    #[test]
    fn test_score_bounds() {
        assert_eq!(heat_score(U256::MAX, usize::MAX, 100.0), 1000);
        assert_eq!(heat_score(U256::MAX, usize::MAX, 250.0), 1000);
        assert_eq!(heat_score(U256::ZERO, 0, -5.0), 0);
        assert_eq!(heat_score(U256::ZERO, 0, f64::NAN), 0);

        for tokens in [0u128, 9, 10, 3_999, 4_000, 1_000_000] {
            for count in [0usize, 1, 29, 30, 31, 1_000] {
                for avg in [0.0, 12.5, 50.0, 99.9, 100.0] {
                    let score = heat_score(U256::from(tokens * ONE_TOKEN), count, avg);
                    assert!(score <= 1000);
                }
            }
        }
    }

    #[test]
    fn test_level_at_exact_thresholds() {
        // 400 amount points + 0 tips + 0 sentiment
        let capped = U256::from(4_000 * ONE_TOKEN);
        assert_eq!(heat_score(capped, 0, 0.0), 400);
        assert_eq!(HeatLevel::from_score(heat_score(capped, 0, 0.0)), HeatLevel::Active);
        assert_eq!(HeatLevel::from_score(heat_score(capped, 20, 0.0)), HeatLevel::HighValue);
        assert_eq!(HeatLevel::from_score(heat_score(capped, 30, 33.333_333_4)), HeatLevel::Frenzied);
        assert_eq!(heat_score(capped, 30, 33.0), 799);
        assert_eq!(HeatLevel::from_score(heat_score(capped, 30, 33.0)), HeatLevel::HighValue);
        assert_eq!(heat_score(U256::from(3_990 * ONE_TOKEN), 0, 0.0), 399);
        assert_eq!(HeatLevel::from_score(399), HeatLevel::Light);
    }

    #[tokio::test]
    async fn test_three_tips_without_messages() {
        let events = vec![
            tip("0xaaa", 10, "0x01", Some(1_700_000_000)),
            tip("0xaaa", 20, "0x02", Some(1_700_000_600)),
            tip("0xAAA", 5, "0x03", None),
        ];

        let profiles = HeatScoreEngine::default()
            .compute_heat(&events, &InMemoryAnnotations::new(), &NeutralSentiment, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(profiles.len(), 1);
        let p = &profiles[0];
        assert_eq!(p.total_amount, U256::from(35 * ONE_TOKEN));
        assert_eq!(p.tip_count, 3);
        assert_eq!(p.message_count, 0);
        assert_eq!(p.sentiment_score, 50);
        assert_eq!(p.sentiment_label, SentimentLabel::Neutral);
        assert_eq!(p.heat_score, 183);
        assert_eq!(p.heat_level, HeatLevel::Light);
        assert_eq!(p.first_tip_date, "2023-11-14T22:13:20+00:00");
        assert_eq!(p.last_tip_date, "2023-11-14T22:23:20+00:00");
        assert_eq!(p.amount_rank, 1);
    }

    #[tokio::test]
    async fn test_messages_drive_sentiment_and_keywords() {
        let mut annotations = InMemoryAnnotations::new();
        annotations.insert_name("0xaaa", "alice");
        annotations.insert_message("0xaaa", "0x01", "love");
        annotations.insert_message("0xaaa", "0x02", "good");
        annotations.insert_message("0xaaa", "0x03", "bad");
        annotations.insert_message("0xaaa", "0x04", "   ");

        let events = vec![
            tip("0xaaa", 1, "0x01", None),
            tip("0xaaa", 1, "0x02", None),
            tip("0xaaa", 1, "0x03", None),
            tip("0xaaa", 1, "0x04", None),
        ];

        let sentiment = ScriptedSentiment::new();
        let profiles = HeatScoreEngine::default()
            .compute_heat(&events, &annotations, &sentiment, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        let p = &profiles[0];
        assert_eq!(p.display_name.as_deref(), Some("alice"));
        assert_eq!(p.message_count, 3);
        assert_eq!(sentiment.calls.lock().unwrap().len(), 3);
        assert_eq!(p.sentiment_score, 60);
        assert_eq!(p.sentiment_label, SentimentLabel::Positive);
        assert_eq!(p.keywords, vec!["stream", "love", "good", "bad"]);
        assert_eq!(p.heat_score, 220);
        assert!(p.first_tip_date.is_empty());
        assert!(p.last_tip_date.is_empty());
    }

    #[tokio::test]
    async fn test_slow_call_times_out_to_neutral() {
        let mut annotations = InMemoryAnnotations::new();
        annotations.insert_message("0xaaa", "0x01", "slow");
        annotations.insert_message("0xbbb", "0x02", "love");
        let events = vec![tip("0xaaa", 1, "0x01", None), tip("0xbbb", 1, "0x02", None)];

        let engine = HeatScoreEngine::new(2, Duration::from_millis(50));
        let profiles = engine
            .compute_heat(&events, &annotations, &ScriptedSentiment::new(), &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        let slow = profiles.iter().find(|p| p.address == "0xaaa").unwrap();
        let fast = profiles.iter().find(|p| p.address == "0xbbb").unwrap();
        assert_eq!(slow.sentiment_score, 50);
        assert_eq!(slow.sentiment_label, SentimentLabel::Neutral);
        assert_eq!(fast.sentiment_score, 100);
    }

    #[tokio::test]
    async fn test_unavailable_analysis_only_affects_its_sender() {
        let mut annotations = InMemoryAnnotations::new();
        annotations.insert_message("0xaaa", "0x01", "fail");
        annotations.insert_message("0xbbb", "0x02", "love");
        annotations.insert_message("0xbbb", "0x03", "good");
        let events = vec![
            tip("0xaaa", 1, "0x01", None),
            tip("0xbbb", 1, "0x02", None),
            tip("0xbbb", 1, "0x03", None),
        ];

        let sentiment = ScriptedSentiment::new();
        let profiles = HeatScoreEngine::default()
            .compute_heat(&events, &annotations, &sentiment, &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(sentiment.calls.lock().unwrap().len(), 3);
        let failed = profiles.iter().find(|p| p.address == "0xaaa").unwrap();
        let healthy = profiles.iter().find(|p| p.address == "0xbbb").unwrap();
        assert_eq!(failed.message_count, 1);
        assert_eq!(failed.sentiment_score, 50);
        assert_eq!(failed.sentiment_label, SentimentLabel::Neutral);
        assert!(failed.keywords.is_empty());
        assert_eq!(failed.heat_score, 10 + 150);
        assert_eq!(healthy.sentiment_score, 90);
        assert_eq!(healthy.sentiment_label, SentimentLabel::Positive);
        assert_eq!(healthy.keywords, vec!["stream", "love", "good"]);
        assert_eq!(healthy.heat_score, 20 + 270);
    }

    #[tokio::test]
    async fn test_orderings_and_progress() {
        let mut annotations = InMemoryAnnotations::new();
        annotations.insert_message("0xccc", "0x05", "love");
        annotations.insert_message("0xbbb", "0x03", "bad");
        let events = vec![
            tip("0xaaa", 500, "0x01", None),
            tip("0xbbb", 500, "0x02", None),
            tip("0xbbb", 1, "0x03", None),
            tip("0xccc", 1, "0x04", None),
            tip("0xccc", 1, "0x05", None),
            tip("0xddd", 500, "0x06", None),
        ];

        let mut progress = Vec::new();
        let profiles = HeatScoreEngine::default()
            .compute_heat(&events, &annotations, &ScriptedSentiment::new(), &CancellationToken::new(), |p| {
                progress.push(p)
            })
            .await
            .unwrap();

        // heat: aaa 50+10+150, bbb 50+20+0, ccc 0+20+300, ddd 50+10+150
        let by_heat: Vec<(&str, u32)> = profiles.iter().map(|p| (p.address.as_str(), p.heat_score)).collect();
        assert_eq!(by_heat, vec![("0xccc", 320), ("0xaaa", 210), ("0xddd", 210), ("0xbbb", 70)]);

        let rank = |addr: &str| profiles.iter().find(|p| p.address == addr).unwrap().amount_rank;
        assert_eq!(rank("0xbbb"), 1);
        assert_eq!(rank("0xaaa"), 2);
        assert_eq!(rank("0xddd"), 3);
        assert_eq!(rank("0xccc"), 4);

        assert_eq!(progress.len(), 4);
        assert_eq!(progress.last().unwrap().completed, 4);
        assert!(progress.iter().all(|p| p.total == 4));
    }

    #[tokio::test]
    async fn test_cancellation_discards_run() {
        let mut annotations = InMemoryAnnotations::new();
        annotations.insert_message("0xaaa", "0x01", "slow");
        let events = vec![tip("0xaaa", 1, "0x01", None)];

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let engine = HeatScoreEngine::new(1, Duration::from_secs(3600));
        let result = engine
            .compute_heat(&events, &annotations, &ScriptedSentiment::new(), &cancel, |_| {})
            .await;

        assert!(matches!(result, Err(AnalyticsError::Cancelled)));
    }
}

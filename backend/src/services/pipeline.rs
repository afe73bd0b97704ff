use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::constants::*;
use crate::error::{AnalyticsError, GatewayError};
use crate::models::{LeaderboardEntry, Period, TimeBucket, TipEvent, UserContributionProfile};
use crate::services::aggregator::TimeBucketAggregator;
use crate::services::annotations::AnnotationLookup;
use crate::services::fetcher::TipFetcher;
use crate::services::gateway::ChainGateway;
use crate::services::heat::HeatScoreEngine;
use crate::services::ranking;
use crate::services::resolver::{BlockTimestampCache, TimestampResolver};
use crate::services::sentiment::SentimentService;
use crate::utils::Config;
use crate::utils::token_conversion::{format_token_amount, u256_decimal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub fill_empty: bool,
    pub top_n: usize,
    /// Skip the sentiment fan-out and leave `profiles` empty
    pub skip_heat: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fill_empty: true,
            top_n: DEFAULT_LEADERBOARD_SIZE,
            skip_heat: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchErrorInfo {
    pub kind: &'static str,
    pub message: String,
}

impl From<&GatewayError> for FetchErrorInfo {
    fn from(error: &GatewayError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Everything one pipeline run derives for a period.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSnapshot {
    pub period: Period,
    pub generated_at: DateTime<Utc>,
    pub latest_block: Option<u64>,
    #[serde(with = "u256_decimal")]
    pub total_amount: U256,
    pub total_amount_tokens: String,
    pub unique_participants: usize,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub series: Vec<TimeBucket>,
    pub profiles: Vec<UserContributionProfile>,
    /// Blocks whose timestamp could not be resolved
    pub resolution_gaps: Vec<u64>,
    /// Set when the chain could not be read; the snapshot is then empty, not zero
    pub fetch_error: Option<FetchErrorInfo>,
}

impl AnalyticsSnapshot {
    fn failed(period: Period, latest_block: Option<u64>, error: &GatewayError) -> Self {
        Self {
            period,
            generated_at: Utc::now(),
            latest_block,
            total_amount: U256::ZERO,
            total_amount_tokens: "0".to_string(),
            unique_participants: 0,
            leaderboard: Vec::new(),
            series: Vec::new(),
            profiles: Vec::new(),
            resolution_gaps: Vec::new(),
            fetch_error: Some(error.into()),
        }
    }
}

/// Gateway -> Fetcher -> Resolver -> Aggregator / Ranking / Heat.
///
/// Clones share the block timestamp cache.
#[derive(Debug, Clone)]
pub struct TipAnalytics {
    fetcher: TipFetcher,
    resolver: TimestampResolver,
    cache: BlockTimestampCache,
    aggregator: TimeBucketAggregator,
    heat: HeatScoreEngine,
}

impl TipAnalytics {
    pub fn new(
        fetcher: TipFetcher,
        resolver: TimestampResolver,
        aggregator: TimeBucketAggregator,
        heat: HeatScoreEngine,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            cache: BlockTimestampCache::new(),
            aggregator,
            heat,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let gateway = ChainGateway::new(
            config.primary_rpc_url.clone(),
            config.secondary_rpc_url.clone(),
            config.rpc_timeout,
        )?;

        Ok(Self::new(
            TipFetcher::new(gateway, config.tip_contract_address.clone()),
            TimestampResolver::new(TIMESTAMP_BATCH_SIZE, Duration::from_millis(TIMESTAMP_BATCH_DELAY_MS)),
            TimeBucketAggregator::new(config.display_timezone),
            HeatScoreEngine::new(config.sentiment_concurrency, config.sentiment_timeout),
        ))
    }

    pub fn cache(&self) -> &BlockTimestampCache {
        &self.cache
    }

    /// Run the whole pipeline for `period`.
    ///
    /// Chain failures yield a snapshot with `fetch_error` set. Cancellation at any stage
    /// returns `Err(Cancelled)` and nothing derived so far is kept.
    pub async fn run(
        &self,
        period: Period,
        options: RunOptions,
        annotations: &dyn AnnotationLookup,
        sentiment: &dyn SentimentService,
        cancel: &CancellationToken,
    ) -> Result<AnalyticsSnapshot, AnalyticsError> {
        ensure_active(cancel)?;

        let latest = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AnalyticsError::Cancelled),
            latest = self.fetcher.gateway().block_number() => latest,
        };
        let latest_block = match latest {
            Ok(block) => block,
            Err(e) => {
                tracing::error!(%period, kind = e.kind(), "Failed to read chain head: {}", e);
                return Ok(AnalyticsSnapshot::failed(period, None, &e));
            }
        };

        let outcome = self.fetcher.fetch_tips(period, latest_block, cancel).await?;
        if let Some(error) = &outcome.error {
            return Ok(AnalyticsSnapshot::failed(period, Some(latest_block), error));
        }

        let block_numbers: Vec<u64> = outcome.events.iter().map(|e| e.block_number).collect();
        let report = self
            .resolver
            .resolve(self.fetcher.gateway(), &block_numbers, &self.cache, cancel)
            .await?;
        let events: Vec<TipEvent> = self.cache.attach(&outcome.events);

        ensure_active(cancel)?;
        let series = self.aggregator.aggregate(&events, period, options.fill_empty, Utc::now());
        let leaderboard = ranking::rank(&events, options.top_n);
        let total_amount = ranking::total_amount(&events);
        let unique_participants = ranking::unique_participants(&events);

        let profiles = if options.skip_heat {
            Vec::new()
        } else {
            self.heat
                .compute_heat(&events, annotations, sentiment, cancel, |progress| {
                    tracing::debug!(
                        address = %progress.address,
                        completed = progress.completed,
                        total = progress.total,
                        "Heat profile ready"
                    );
                })
                .await?
        };

        ensure_active(cancel)?;

        // Gaps include blocks that failed in earlier runs of this session
        let mut resolution_gaps: Vec<u64> = events
            .iter()
            .filter(|e| e.timestamp.is_none())
            .map(|e| e.block_number)
            .collect();
        resolution_gaps.sort_unstable();
        resolution_gaps.dedup();

        tracing::info!(
            %period,
            latest_block,
            events = events.len(),
            participants = unique_participants,
            newly_unresolved = report.gaps.len(),
            "Tip analytics run complete"
        );

        Ok(AnalyticsSnapshot {
            period,
            generated_at: Utc::now(),
            latest_block: Some(latest_block),
            total_amount,
            total_amount_tokens: format_token_amount(total_amount, TOKEN_DECIMALS),
            unique_participants,
            leaderboard,
            series,
            profiles,
            resolution_gaps,
            fetch_error: None,
        })
    }
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), AnalyticsError> {
    if cancel.is_cancelled() {
        Err(AnalyticsError::Cancelled)
    } else {
        Ok(())
    }
}

/// Handle for one pipeline run issued by [`RunCoordinator`].
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub generation: u64,
    pub token: CancellationToken,
}

#[derive(Debug)]
struct CoordinatorState {
    generation: u64,
    current: Option<CancellationToken>,
}

/// Makes sure only the newest run publishes.
///
/// Starting a run cancels the one before it; a result from an older generation is
/// rejected even if it finished.
#[derive(Debug)]
pub struct RunCoordinator {
    root: CancellationToken,
    state: Mutex<CoordinatorState>,
}

impl RunCoordinator {
    /// Cancelling `root` cancels every run issued from here.
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            state: Mutex::new(CoordinatorState {
                generation: 0,
                current: None,
            }),
        }
    }

    pub fn begin(&self) -> RunTicket {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = state.current.take() {
            previous.cancel();
        }
        state.generation += 1;
        let token = self.root.child_token();
        state.current = Some(token.clone());

        RunTicket {
            generation: state.generation,
            token,
        }
    }

    pub fn latest_generation(&self) -> u64 {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).generation
    }

    pub fn is_current(&self, ticket: &RunTicket) -> bool {
        self.latest_generation() == ticket.generation && !ticket.token.is_cancelled()
    }

    /// Hand back `value` only if `ticket` is still the newest run.
    pub fn publish<T>(&self, ticket: &RunTicket, value: T) -> Result<T, AnalyticsError> {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.generation == ticket.generation && !ticket.token.is_cancelled() {
            Ok(value)
        } else {
            Err(AnalyticsError::Superseded {
                latest: state.generation,
            })
        }
    }
}

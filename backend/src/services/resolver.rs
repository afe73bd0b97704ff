use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::constants::*;
use crate::error::{AnalyticsError, GatewayError};
use crate::models::TipEvent;
use crate::services::gateway::ChainGateway;

/// Anything that can look up the timestamp of a block.
#[async_trait]
pub trait BlockTimestampSource: Send + Sync {
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, GatewayError>;
}

#[async_trait]
impl BlockTimestampSource for ChainGateway {
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, GatewayError> {
        ChainGateway::block_timestamp(self, block_number).await
    }
}

/// Session-scoped `block number -> unix seconds` memo.
///
/// Entries are written once and never replaced or evicted. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct BlockTimestampCache {
    inner: Arc<RwLock<HashMap<u64, u64>>>,
}

impl BlockTimestampCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, block_number: u64) -> Option<u64> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&block_number)
            .copied()
    }

    pub fn contains(&self, block_number: u64) -> bool {
        self.get(block_number).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a whole batch under one write lock; existing entries win.
    fn insert_batch(&self, entries: &[(u64, u64)]) {
        let mut map = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        for &(block_number, timestamp) in entries {
            map.entry(block_number).or_insert(timestamp);
        }
    }

    /// Copies of `events` with timestamps attached from the cache.
    /// Blocks missing from the cache or recorded as unresolved stay `None`.
    pub fn attach(&self, events: &[TipEvent]) -> Vec<TipEvent> {
        let map = self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        events
            .iter()
            .map(|event| match map.get(&event.block_number) {
                Some(&timestamp) => event.with_block_timestamp(timestamp),
                None => event.clone(),
            })
            .collect()
    }
}

/// Outcome of a resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionReport {
    /// Blocks looked up during this pass
    pub requested: usize,
    /// Blocks whose lookup failed and were recorded as unresolved
    pub gaps: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct TimestampResolver {
    batch_size: usize,
    batch_delay: Duration,
}

impl Default for TimestampResolver {
    fn default() -> Self {
        Self::new(TIMESTAMP_BATCH_SIZE, Duration::from_millis(TIMESTAMP_BATCH_DELAY_MS))
    }
}

impl TimestampResolver {
    pub fn new(batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            batch_delay,
        }
    }

    /// Fill `cache` with timestamps for every block in `block_numbers` it does not hold yet.
    ///
    /// Lookups run concurrently within a batch and batches run one at a time. A failed
    /// lookup is recorded as the unresolved sentinel instead of failing the batch.
    pub async fn resolve<S: BlockTimestampSource + ?Sized>(
        &self,
        source: &S,
        block_numbers: &[u64],
        cache: &BlockTimestampCache,
        cancel: &CancellationToken,
    ) -> Result<ResolutionReport, AnalyticsError> {
        let missing: Vec<u64> = block_numbers
            .iter()
            .copied()
            .collect::<BTreeSet<u64>>()
            .into_iter()
            .filter(|block| !cache.contains(*block))
            .collect();

        let mut report = ResolutionReport {
            requested: missing.len(),
            gaps: Vec::new(),
        };
        if missing.is_empty() {
            return Ok(report);
        }

        tracing::debug!(blocks = missing.len(), batch_size = self.batch_size, "Resolving block timestamps");

        for (index, batch) in missing.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(AnalyticsError::Cancelled);
            }
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AnalyticsError::Cancelled),
                    _ = tokio::time::sleep(self.batch_delay) => {}
                }
            }

            let lookups = batch.iter().map(|&block_number| async move {
                match source.block_timestamp(block_number).await {
                    Ok(timestamp) => (block_number, timestamp),
                    Err(e) => {
                        tracing::debug!(block_number, kind = e.kind(), "Timestamp lookup failed: {}", e);
                        (block_number, UNRESOLVED_TIMESTAMP)
                    }
                }
            });
            let results = join_all(lookups).await;

            // A cancelled run must not leave half a batch behind
            if cancel.is_cancelled() {
                return Err(AnalyticsError::Cancelled);
            }

            report.gaps.extend(
                results
                    .iter()
                    .filter(|(_, timestamp)| *timestamp == UNRESOLVED_TIMESTAMP)
                    .map(|(block_number, _)| *block_number),
            );
            cache.insert_batch(&results);
        }

        if !report.gaps.is_empty() {
            tracing::warn!(
                unresolved = report.gaps.len(),
                requested = report.requested,
                "Some block timestamps could not be resolved"
            );
        }

        Ok(report)
    }
}

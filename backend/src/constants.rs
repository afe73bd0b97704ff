// =============================================================================
// TipHeat Backend Constants
// =============================================================================
// This file contains all constants used throughout the backend to enable
// easy tuning and configuration from a single location.

// =============================================================================
// EVENT TOPICS
// =============================================================================

/// Canonical signature of the tip event emitted by the reward contract
pub const TIPPED_EVENT_SIGNATURE: &str = "Tipped(address,uint256)";

/// Decimals of the reward token (amounts on chain are in the smallest unit)
pub const TOKEN_DECIMALS: u8 = 18;

// =============================================================================
// LOG WINDOW CONFIGURATION
// =============================================================================

/// Lookback for the "day" period (~2s block time)
pub const DAY_LOOKBACK_BLOCKS: u64 = 43_200;

/// Lookback for the "week" period
pub const WEEK_LOOKBACK_BLOCKS: u64 = 302_400;

/// Lookback for the "month" period, before the span ceiling applies
pub const MONTH_LOOKBACK_BLOCKS: u64 = 1_296_000;

/// Ceiling on the span queried for any period; "all" always uses the full ceiling
pub const MAX_ALL_PERIOD_SPAN_BLOCKS: u64 = 500_000;

// =============================================================================
// TIMESTAMP RESOLUTION
// =============================================================================

/// Blocks looked up concurrently per batch
pub const TIMESTAMP_BATCH_SIZE: usize = 10;

/// Pause between timestamp batches
pub const TIMESTAMP_BATCH_DELAY_MS: u64 = 50;

/// Timestamp recorded for blocks whose lookup failed
pub const UNRESOLVED_TIMESTAMP: u64 = 0;

// =============================================================================
// TIME BUCKETS
// =============================================================================

/// Width of an intraday bucket for the "day" period
pub const DAY_BUCKET_MINUTES: u32 = 15;

/// Number of intraday buckets in a calendar day
pub const DAY_BUCKET_COUNT: usize = 96;

/// Calendar days covered by a filled "week" series
pub const WEEK_BUCKET_DAYS: i64 = 7;

/// Calendar days covered by a filled "month" series
pub const MONTH_BUCKET_DAYS: i64 = 30;

// =============================================================================
// HEAT SCORE
// =============================================================================

/// Cap on the amount component
pub const MAX_AMOUNT_SCORE: u64 = 400;

/// Whole tokens per amount point
pub const WHOLE_TOKENS_PER_AMOUNT_POINT: u64 = 10;

/// Cap on the frequency component
pub const MAX_FREQUENCY_SCORE: u64 = 300;

/// Frequency points per tip
pub const FREQUENCY_POINTS_PER_TIP: u64 = 10;

/// Weight of the sentiment component (applied to avg/100)
pub const SENTIMENT_WEIGHT: f64 = 300.0;

/// Inclusive lower bound of the "frenzied" level
pub const FRENZIED_THRESHOLD: u32 = 800;

/// Inclusive lower bound of the "high-value" level
pub const HIGH_VALUE_THRESHOLD: u32 = 600;

/// Inclusive lower bound of the "active" level
pub const ACTIVE_THRESHOLD: u32 = 400;

/// Keywords kept per profile
pub const MAX_PROFILE_KEYWORDS: usize = 5;

// =============================================================================
// SENTIMENT SERVICE
// =============================================================================

/// Score returned when a message could not be analyzed
pub const NEUTRAL_SENTIMENT_SCORE: u8 = 50;

/// Default number of sentiment calls in flight
pub const DEFAULT_SENTIMENT_CONCURRENCY: usize = 4;

/// Default per-call timeout for sentiment calls
pub const DEFAULT_SENTIMENT_TIMEOUT_MS: u64 = 5_000;

/// Maximum sentiment API requests per minute
pub const SENTIMENT_RATE_LIMIT_PER_MINUTE: u32 = 120;

/// Rate limit window duration in seconds
pub const RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

// =============================================================================
// RPC CONFIGURATION
// =============================================================================

/// Default timeout for a single JSON-RPC request
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// SERVER CONFIGURATION
// =============================================================================

/// Default server port if not specified in environment
pub const DEFAULT_SERVER_PORT: u16 = 3000;

/// Default leaderboard size
pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;

/// Default interval between watcher runs
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

// =============================================================================
// ADDRESS VALIDATION
// =============================================================================

/// Expected length of Ethereum address (including 0x prefix)
pub const ETHEREUM_ADDRESS_LENGTH: usize = 42;

/// Ethereum address prefix
pub const ETHEREUM_ADDRESS_PREFIX: &str = "0x";

// =============================================================================
// HELPER FUNCTIONS FOR VALIDATION
// =============================================================================

/// Validates if a string is a valid Ethereum address format
pub fn is_valid_ethereum_address(address: &str) -> bool {
    address.starts_with(ETHEREUM_ADDRESS_PREFIX)
        && address.len() == ETHEREUM_ADDRESS_LENGTH
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

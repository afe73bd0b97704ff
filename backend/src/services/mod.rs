pub mod aggregator;
pub mod annotations;
pub mod fetcher;
pub mod gateway;
pub mod heat;
pub mod pipeline;
pub mod ranking;
pub mod resolver;
pub mod sentiment;

pub use aggregator::TimeBucketAggregator;
pub use annotations::{AnnotationLookup, InMemoryAnnotations};
pub use fetcher::{FetchOutcome, TipFetcher};
pub use gateway::ChainGateway;
pub use heat::{HeatProgress, HeatScoreEngine};
pub use pipeline::{AnalyticsSnapshot, RunCoordinator, RunOptions, RunTicket, TipAnalytics};
pub use resolver::{BlockTimestampCache, TimestampResolver};
pub use sentiment::{HttpSentimentService, NeutralSentiment, SentimentService};

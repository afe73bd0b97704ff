pub mod heat;
pub mod tips;

pub use heat::{HeatLevel, SentimentAnalysis, SentimentLabel, UserContributionProfile};
pub use tips::{LeaderboardEntry, Period, TimeBucket, TipEvent};

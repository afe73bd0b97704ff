use thiserror::Error;

/// Failure of a JSON-RPC call after the fallback hop (if any) was tried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The node refused the request because of a plan/block-range limit.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The node has not finished building its historical index.
    #[error("node still indexing: {0}")]
    StillIndexing(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Stable label for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RateLimited(_) => "rate_limited",
            GatewayError::StillIndexing(_) => "still_indexing",
            GatewayError::Transport(_) => "transport_error",
            GatewayError::Protocol(_) => "protocol_error",
        }
    }

    /// Whether the node told us something specific about why it refused.
    pub fn is_classified(&self) -> bool {
        matches!(self, GatewayError::RateLimited(_) | GatewayError::StillIndexing(_))
    }
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("run cancelled")]
    Cancelled,

    #[error("run superseded by generation {latest}")]
    Superseded { latest: u64 },
}

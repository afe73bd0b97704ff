use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use crate::constants::*;
use crate::models::{SentimentAnalysis, SentimentLabel};

/// Classifier for free-text tip messages.
///
/// Implementations never fail: anything that goes wrong yields [`SentimentAnalysis::neutral`].
#[async_trait]
pub trait SentimentService: Send + Sync {
    async fn analyze(&self, message: &str) -> SentimentAnalysis;
}

/// Scores every message as neutral. Used when no sentiment API is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralSentiment;

#[async_trait]
impl SentimentService for NeutralSentiment {
    async fn analyze(&self, _message: &str) -> SentimentAnalysis {
        SentimentAnalysis::neutral()
    }
}

// Rate limiting structure
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// Claims a slot, or returns how long until the oldest one frees up
    fn try_acquire(&mut self) -> Result<(), Duration> {
        let now = Instant::now();
        let window = self.window;

        // Remove old requests
        self.requests.retain(|&time| now.duration_since(time) < window);

        if self.requests.len() < self.max_requests as usize {
            self.requests.push(now);
            Ok(())
        } else {
            let oldest = self.requests.iter().min().copied().unwrap_or(now);
            Err(window.saturating_sub(now.duration_since(oldest)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    score: f64,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct HttpSentimentService {
    client: Client,
    api_url: String,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl HttpSentimentService {
    pub fn new(api_url: String, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_rate_limit(
            api_url,
            timeout,
            SENTIMENT_RATE_LIMIT_PER_MINUTE,
            Duration::from_secs(RATE_LIMIT_WINDOW_SECONDS),
        )
    }

    /// Allows at most `max_requests` calls per sliding `window`. Calls over budget wait.
    pub fn with_rate_limit(
        api_url: String,
        timeout: Duration,
        max_requests: u32,
        window: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build sentiment client: {}", e))?;

        Ok(Self {
            client,
            api_url,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(max_requests, window))),
        })
    }

    async fn request_analysis(&self, message: &str) -> anyhow::Result<SentimentAnalysis> {
        let response = self
            .client
            .post(&self.api_url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await?
            .error_for_status()?;

        let body: SentimentResponse = response.json().await?;
        Ok(normalize_response(body))
    }
}

#[async_trait]
impl SentimentService for HttpSentimentService {
    async fn analyze(&self, message: &str) -> SentimentAnalysis {
        // Over budget means waiting, never a different score; callers bound the wait
        loop {
            let acquired = self.rate_limiter.lock().await.try_acquire();
            match acquired {
                Ok(()) => break,
                Err(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Sentiment API budget exhausted, waiting");
                    tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
                }
            }
        }

        match self.request_analysis(message).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::warn!("Sentiment analysis unavailable: {}, scoring message as neutral", e);
                SentimentAnalysis::neutral()
            }
        }
    }
}

fn label_for_score(score: u8) -> SentimentLabel {
    match score {
        60..=100 => SentimentLabel::Positive,
        41..=59 => SentimentLabel::Neutral,
        _ => SentimentLabel::Negative,
    }
}

fn normalize_response(body: SentimentResponse) -> SentimentAnalysis {
    let score = if body.score.is_finite() {
        body.score.clamp(0.0, 100.0).round() as u8
    } else {
        NEUTRAL_SENTIMENT_SCORE
    };

    let label = match body.label.as_deref().map(|l| l.trim().to_lowercase()).as_deref() {
        Some("positive") => SentimentLabel::Positive,
        Some("neutral") => SentimentLabel::Neutral,
        Some("negative") => SentimentLabel::Negative,
        _ => label_for_score(score),
    };

    let keywords = body
        .keywords
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    SentimentAnalysis { score, label, keywords }
}

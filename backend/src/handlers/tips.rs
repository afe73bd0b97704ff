use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::constants::*;
use crate::error::AnalyticsError;
use crate::models::{Period, UserContributionProfile};
use crate::services::annotations::AnnotationLookup;
use crate::services::pipeline::{AnalyticsSnapshot, FetchErrorInfo, RunOptions, TipAnalytics};
use crate::services::sentiment::SentimentService;

/// Shared by every request. The timestamp cache inside `analytics` lives for the process.
pub struct AppState {
    pub analytics: TipAnalytics,
    pub annotations: Arc<dyn AnnotationLookup>,
    pub sentiment: Arc<dyn SentimentService>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    period: Option<String>,
    #[serde(default)]
    fill: Option<bool>,
    #[serde(default)]
    top: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HeatQuery {
    #[serde(default)]
    period: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HeatResponse {
    pub period: Period,
    pub generated_at: DateTime<Utc>,
    pub profiles: Vec<UserContributionProfile>,
    pub fetch_error: Option<FetchErrorInfo>,
}

type ApiError = (StatusCode, Json<Value>);

/// Totals, leaderboard and bucketed series for a period
pub async fn tip_summary(
    Query(params): Query<SummaryQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<AnalyticsSnapshot>, ApiError> {
    let period = parse_period(params.period.as_deref())?;
    let options = RunOptions {
        fill_empty: params.fill.unwrap_or(true),
        top_n: params.top.unwrap_or(DEFAULT_LEADERBOARD_SIZE),
        skip_heat: true,
    };

    let snapshot = run(&state, period, options).await?;
    Ok(Json(snapshot))
}

/// Per-sender heat profiles for a period
pub async fn tip_heat(
    Query(params): Query<HeatQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<HeatResponse>, ApiError> {
    let period = parse_period(params.period.as_deref())?;
    let options = RunOptions {
        fill_empty: false,
        ..RunOptions::default()
    };

    let snapshot = run(&state, period, options).await?;
    Ok(Json(HeatResponse {
        period: snapshot.period,
        generated_at: snapshot.generated_at,
        profiles: snapshot.profiles,
        fetch_error: snapshot.fetch_error,
    }))
}

fn parse_period(raw: Option<&str>) -> Result<Period, ApiError> {
    match raw {
        None => Ok(Period::Day),
        Some(value) => value.parse().map_err(|e: String| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e })),
            )
        }),
    }
}

async fn run(state: &AppState, period: Period, options: RunOptions) -> Result<AnalyticsSnapshot, ApiError> {
    // Each request owns its run; dropping the request drops the future
    let cancel = CancellationToken::new();

    state
        .analytics
        .run(
            period,
            options,
            state.annotations.as_ref(),
            state.sentiment.as_ref(),
            &cancel,
        )
        .await
        .map_err(|e: AnalyticsError| {
            tracing::error!(%period, "Tip analytics run failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })
}

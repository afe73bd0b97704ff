pub mod tips;

use axum::{Router, routing::get};
use std::sync::Arc;

pub use tips::{AppState, tip_heat, tip_summary};

/// API routes without middleware; the server binary adds CORS on top.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/tips/summary", get(tip_summary))
        .route("/api/tips/heat", get(tip_heat))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

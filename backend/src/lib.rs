pub mod constants;
pub mod error;
pub mod models;
pub mod db;
pub mod services;
pub mod handlers;
pub mod utils;

pub use utils::config::Config;
pub use db::connection::get_db_pool;
pub use error::{AnalyticsError, GatewayError};

// Re-export common types
pub use sqlx::PgPool;
pub use anyhow::Result;
pub use alloy::primitives::U256;
pub use chrono::{DateTime, Utc};

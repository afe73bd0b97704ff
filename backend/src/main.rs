use axum::Router;
use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use tipheat::db::{self, DatabaseConfig};
use tipheat::handlers::{self, AppState};
use tipheat::services::{
    AnnotationLookup, HttpSentimentService, InMemoryAnnotations, NeutralSentiment, SentimentService, TipAnalytics,
};
use tipheat::{Config, get_db_pool, utils};
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::init_logging();

    let config = Config::from_env()?;
    let annotations = load_annotations(&config).await?;
    let sentiment = create_sentiment_service(&config)?;
    let analytics = TipAnalytics::from_config(&config)?;

    let state = Arc::new(AppState {
        analytics,
        annotations,
        sentiment,
    });

    let port = config.port;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Server running on port {}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

fn create_router(state: Arc<AppState>) -> Router {
    handlers::router(state).layer(create_cors_layer())
}

async fn load_annotations(config: &Config) -> anyhow::Result<Arc<dyn AnnotationLookup>> {
    let Some(database_url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, serving without display names or messages");
        return Ok(Arc::new(InMemoryAnnotations::new()));
    };

    let pool = get_db_pool(&DatabaseConfig::from_url(database_url.clone())).await?;
    db::migrations::run_migrations(&pool).await?;
    let annotations = db::load_annotations(&pool).await?;
    Ok(Arc::new(annotations))
}

fn create_sentiment_service(config: &Config) -> anyhow::Result<Arc<dyn SentimentService>> {
    match &config.sentiment_api_url {
        Some(url) => Ok(Arc::new(HttpSentimentService::new(url.clone(), config.sentiment_timeout)?)),
        None => {
            tracing::info!("SENTIMENT_API_URL not set, every message scores neutral");
            Ok(Arc::new(NeutralSentiment))
        }
    }
}

fn create_cors_layer() -> CorsLayer {
    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
        .allow_credentials(false);

    // Comma-separated list of allowed origins
    if let Ok(cors_origins) = std::env::var("ALLOWED_ORIGINS") {
        let origins: Vec<HeaderValue> = cors_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .filter_map(|origin| origin.parse().ok())
            .collect();

        if origins.is_empty() {
            cors = cors.allow_origin(Any);
        } else {
            cors = cors.allow_origin(origins);
        }
    } else {
        cors = cors.allow_origin(Any);
    }

    cors
}

use anyhow::Result;
use clap::{Arg, Command, value_parser};
use std::sync::Arc;
use std::time::Duration;
use tipheat::{
    constants::*,
    db::{self, get_db_pool, DatabaseConfig},
    error::AnalyticsError,
    models::Period,
    services::{
        AnalyticsSnapshot, AnnotationLookup, HttpSentimentService, InMemoryAnnotations, NeutralSentiment,
        RunCoordinator, RunOptions, RunTicket, SentimentService, TipAnalytics,
    },
    utils::{init_logging, config::Config, token_conversion::format_token_amount},
};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

struct Watcher {
    analytics: TipAnalytics,
    annotations: Arc<dyn AnnotationLookup>,
    sentiment: Arc<dyn SentimentService>,
    coordinator: RunCoordinator,
    period: Period,
    options: RunOptions,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let matches = Command::new("tip-watcher")
        .about("Periodically recompute tip leaderboards, activity series and heat profiles")
        .arg(
            Arg::new("period")
                .long("period")
                .help("Window to analyze: day, week, month or all")
                .default_value("day"),
        )
        .arg(
            Arg::new("interval-secs")
                .long("interval-secs")
                .help("Seconds between runs (default 60)")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("top")
                .long("top")
                .help("Leaderboard size (default 10)")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Run a single pass and print the snapshot as JSON")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let period: Period = matches
        .get_one::<String>("period")
        .map(String::as_str)
        .unwrap_or("day")
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let interval_secs = matches
        .get_one::<u64>("interval-secs")
        .copied()
        .unwrap_or(DEFAULT_WATCH_INTERVAL_SECS)
        .max(1);
    let top_n = matches.get_one::<usize>("top").copied().unwrap_or(DEFAULT_LEADERBOARD_SIZE);
    let once = matches.get_flag("once");

    info!("🔥 Starting tip watcher for period '{}'...", period);

    let config = Config::from_env()?;
    let root = CancellationToken::new();
    let watcher = Arc::new(Watcher {
        analytics: TipAnalytics::from_config(&config)?,
        annotations: load_annotations(&config).await?,
        sentiment: create_sentiment_service(&config)?,
        coordinator: RunCoordinator::new(root.clone()),
        period,
        options: RunOptions {
            fill_empty: true,
            top_n,
            skip_heat: false,
        },
    });

    let shutdown = root.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, cancelling in-flight run");
        }
        shutdown.cancel();
    });

    if once {
        let ticket = watcher.coordinator.begin();
        if let Some(snapshot) = run_once(&watcher, ticket).await {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        return Ok(());
    }

    run_watch_loop(watcher, root, Duration::from_secs(interval_secs)).await;
    Ok(())
}

async fn run_watch_loop(watcher: Arc<Watcher>, root: CancellationToken, every: Duration) {
    let mut interval = time::interval(every);
    let mut iter_count: usize = 0;

    loop {
        tokio::select! {
            biased;
            _ = root.cancelled() => break,
            _ = interval.tick() => {}
        }
        iter_count += 1;

        // Supersedes whatever run is still going from the previous tick
        let ticket = watcher.coordinator.begin();
        info!("📊 Watcher iteration {} | generation {}", iter_count, ticket.generation);

        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move {
            run_once(&watcher, ticket).await;
        });
    }

    info!("👋 Tip watcher stopped after {} iterations", iter_count);
}

async fn run_once(watcher: &Watcher, ticket: RunTicket) -> Option<AnalyticsSnapshot> {
    let result = watcher
        .analytics
        .run(
            watcher.period,
            watcher.options,
            watcher.annotations.as_ref(),
            watcher.sentiment.as_ref(),
            &ticket.token,
        )
        .await
        .and_then(|snapshot| watcher.coordinator.publish(&ticket, snapshot));

    match result {
        Ok(snapshot) => {
            log_snapshot(&snapshot);
            Some(snapshot)
        }
        Err(AnalyticsError::Cancelled) => {
            info!("⏹️ Run {} cancelled", ticket.generation);
            None
        }
        Err(AnalyticsError::Superseded { latest }) => {
            info!("⏭️ Run {} finished after generation {} started, discarding", ticket.generation, latest);
            None
        }
        Err(e) => {
            error!("❌ Run {} failed: {}", ticket.generation, e);
            None
        }
    }
}

fn log_snapshot(snapshot: &AnalyticsSnapshot) {
    if let Some(fetch_error) = &snapshot.fetch_error {
        warn!(
            "⚠️ Tip activity for '{}' unavailable ({}): {}",
            snapshot.period, fetch_error.kind, fetch_error.message
        );
        return;
    }

    info!(
        "✅ {} | {} tokens from {} tippers | {} buckets | {} unresolved blocks",
        snapshot.period,
        snapshot.total_amount_tokens,
        snapshot.unique_participants,
        snapshot.series.len(),
        snapshot.resolution_gaps.len()
    );
    for (position, entry) in snapshot.leaderboard.iter().enumerate() {
        info!(
            "  #{} {} {} tokens ({} tips)",
            position + 1,
            entry.address,
            format_token_amount(entry.total, TOKEN_DECIMALS),
            entry.tip_count
        );
    }
    if let Some(hottest) = snapshot.profiles.first() {
        info!(
            "🔥 Hottest: {} heat {} ({:?})",
            hottest.display_name.as_deref().unwrap_or(&hottest.address),
            hottest.heat_score,
            hottest.heat_level
        );
    }
}

async fn load_annotations(config: &Config) -> Result<Arc<dyn AnnotationLookup>> {
    match &config.database_url {
        Some(database_url) => {
            let pool = get_db_pool(&DatabaseConfig::from_url(database_url.clone())).await?;
            Ok(Arc::new(db::load_annotations(&pool).await?))
        }
        None => Ok(Arc::new(InMemoryAnnotations::new())),
    }
}

fn create_sentiment_service(config: &Config) -> Result<Arc<dyn SentimentService>> {
    match &config.sentiment_api_url {
        Some(url) => Ok(Arc::new(HttpSentimentService::new(url.clone(), config.sentiment_timeout)?)),
        None => Ok(Arc::new(NeutralSentiment)),
    }
}

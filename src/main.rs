//! Volley server - task delegation for group chats

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use volley::chat::{Directory, Messenger};
use volley::engine::{Engine, EngineConfig};
use volley::scheduler::Scheduler;
use volley::slack::SlackClient;
use volley::store::Store;
use volley::{server, AppState};

/// Task delegation server: asks one teammate at a time until someone
/// accepts.
#[derive(Debug, Parser)]
#[command(name = "volley", version)]
struct Config {
    /// Address to listen on
    #[arg(long, env = "VOLLEY_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:volley.db")]
    database_url: String,

    /// Slack Web API base URL
    #[arg(long, env = "SLACK_API_URL", default_value = "https://slack.com/api")]
    slack_api_url: String,

    /// Bot token used for outgoing Slack calls
    #[arg(long, env = "SLACK_BOT_TOKEN")]
    slack_bot_token: String,

    /// Token Slack sends with every webhook delivery
    #[arg(long, env = "SLACK_VERIFICATION_TOKEN")]
    verification_token: String,

    /// Seconds a candidate gets to respond before the request moves on
    #[arg(long, env = "VOLLEY_RESPONSE_TIMEOUT", default_value_t = 300)]
    response_timeout: u64,

    /// Seconds an unresolved request stays loadable in the store
    #[arg(long, env = "VOLLEY_REQUEST_TTL", default_value_t = 86_400)]
    request_ttl: u64,

    /// Seconds between sweeps of expired store rows
    #[arg(long, env = "VOLLEY_SWEEP_INTERVAL", default_value_t = 600)]
    sweep_interval: u64,

    /// Smallest candidate pool that lets a request start
    #[arg(long, env = "VOLLEY_MIN_INITIAL_CANDIDATES", default_value_t = 2)]
    min_initial_candidates: usize,

    /// Smallest candidate pool that keeps a request going after a reject
    /// or timeout
    #[arg(long, env = "VOLLEY_MIN_RETRY_CANDIDATES", default_value_t = 1)]
    min_retry_candidates: usize,

    /// Send a "too late" note to responders who are not the pending
    /// candidate instead of ignoring them
    #[arg(long, env = "VOLLEY_NOTIFY_LATE_RESPONDER")]
    notify_late_responder: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "volley=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    // Database connection
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = Store::new(pool, Duration::from_secs(config.request_ttl));

    // Reads filter expired rows regardless; the sweep keeps the table
    // from growing without bound.
    let sweeper = store.clone();
    let sweep_interval = Duration::from_secs(config.sweep_interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            match sweeper.purge_expired().await {
                Ok(0) => {}
                Ok(rows) => tracing::info!(rows, "purged expired requests"),
                Err(e) => tracing::error!("expired-request sweep failed: {}", e),
            }
        }
    });

    let slack = Arc::new(SlackClient::new(config.slack_api_url, config.slack_bot_token));
    let engine = Engine::new(
        store,
        slack.clone() as Arc<dyn Directory>,
        slack as Arc<dyn Messenger>,
        Scheduler::new(Duration::from_secs(config.response_timeout)),
        EngineConfig {
            min_initial_candidates: config.min_initial_candidates,
            min_retry_candidates: config.min_retry_candidates,
            notify_late_responder: config.notify_late_responder,
        },
    );

    let state = AppState::new(engine, config.verification_token);
    let app = server::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

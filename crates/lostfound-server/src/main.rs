//! Lost-and-found bot server
//!
//! Receives WeCom application callbacks, drives the intake dialog and pushes results
//! back through the WeCom message API.

mod config;
mod routes;
mod state;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use lostfound::codec::PlaintextCodec;
use lostfound::services::{
    HttpImageFetcher, JiebaTagExtractor, LogNotifier, Notifier, SqliteRecorder, WeComNotifier,
};
use lostfound::{EffectRunner, SessionStore, StageDispatcher};
use sqlx::sqlite::SqlitePoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lostfound_server=info,lostfound=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration, a file path argument takes precedence over the environment
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)?,
        None => Config::from_env()?,
    };
    info!("Starting lost-and-found bot on {}:{}", config.host, config.port);

    let database_url = config.database_url.clone();
    info!("Connecting to database: {}", database_url);

    // Ensure parent directory exists for SQLite
    if database_url.starts_with("sqlite:") {
        let path = database_url.trim_start_matches("sqlite:");
        let path = path.trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    std::fs::create_dir_all(&config.image_dir)?;

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await?;

    info!("Running database migrations...");
    lostfound::migrations::run_migration(&pool).await?;
    info!("Database migrations completed");
    let pool = Arc::new(pool);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let notifier: Arc<dyn Notifier> = if config.has_credentials() {
        let notifier = WeComNotifier::new(http.clone(), config.credentials())
            .with_max_attempts(config.push_max_attempts);
        if let Err(e) = notifier.refresh_access_token().await {
            warn!(error = %e, "Initial access token fetch failed, will retry on first push");
        }
        Arc::new(notifier)
    } else {
        warn!("WECOM_CORP_ID / WECOM_CORP_SECRET not set, pushes are only logged");
        Arc::new(LogNotifier)
    };
    if config.encoding_aes_key.is_some() {
        warn!("WECOM_ENCODING_AES_KEY is set but callbacks are handled in plaintext mode");
    }

    let dialog = Arc::new(config.dialog_config());
    let recorder = Arc::new(SqliteRecorder::new(pool.clone()));
    let sessions = Arc::new(SessionStore::new());
    let dispatcher = Arc::new(StageDispatcher::new(
        sessions.clone(),
        dialog.clone(),
        recorder.clone(),
        Arc::new(JiebaTagExtractor::with_cities(&dialog.cities)),
    ));
    let runner = Arc::new(EffectRunner::new(
        notifier,
        recorder,
        Arc::new(HttpImageFetcher::new(http, &config.image_dir)),
        dialog,
    ));

    // Background eviction of idle sessions
    {
        let sessions = sessions.clone();
        let interval = Duration::from_secs(config.session_sweep_interval_secs.max(1));
        let max_idle = Duration::from_secs(config.session_idle_timeout_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                sessions.evict_idle(max_idle).await;
            }
        });
    }

    let state = Arc::new(AppState {
        pool,
        config: config.clone(),
        dispatcher,
        runner,
        codec: Arc::new(PlaintextCodec::new(config.token.clone())),
    });

    let app = build_router(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(state.clone());

    Router::new()
        .merge(public_routes)
        .merge(routes::bot_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn root() -> &'static str {
    "Lost-and-found bot"
}

async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(state.pool.as_ref()).await {
        Ok(_) => Ok(Json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "sessions": state.sessions().len().await,
            "version": env!("CARGO_PKG_VERSION")
        }))),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

mod alert;
mod api;
mod config;
mod cycle;
mod db;
mod detector;
mod error;
mod source;
mod state;
mod types;

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alert::{AlertSink, DiscordNotifier, LogSink};
use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::cycle::CycleRunner;
use crate::db::ResultStore;
use crate::error::Result;
use crate::source::{JsonDirSourceLoader, SourceLoader, SqliteSourceLoader};
use crate::state::ScanSnapshot;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", cfg.db_path))?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    let store = ResultStore::new(pool.clone());
    for group in cfg.policy.alertable_groups() {
        store.ensure_table(&group).await?;
    }
    info!("Database ready at {}", cfg.db_path);

    // --- Source loader ---
    let loader: Arc<dyn SourceLoader> = match &cfg.source_dir {
        Some(dir) => Arc::new(JsonDirSourceLoader::new(dir)),
        None => Arc::new(SqliteSourceLoader::new(pool.clone())),
    };
    info!(
        "Sources ({}): {} | premium: {:?} | excluded: {:?}",
        loader.describe(),
        cfg.policy.sources.join(", "),
        cfg.policy.premium,
        cfg.policy.excluded,
    );

    // --- Alert sink ---
    let sink: Arc<dyn AlertSink> = match &cfg.discord_webhook_url {
        Some(url) => Arc::new(DiscordNotifier::new(
            url.clone(),
            cfg.alert_footer.clone(),
            cfg.source_images.clone(),
        )?),
        None => {
            warn!("DISCORD_WEBHOOK_URL not set, alerts will only be logged");
            Arc::new(LogSink)
        }
    };

    // --- Shared state ---
    let snapshot = ScanSnapshot::new();
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());

    let runner = CycleRunner::new(
        &cfg,
        loader,
        store.clone(),
        sink,
        Arc::clone(&snapshot),
        Arc::clone(&health),
        Arc::clone(&latency),
    );

    if cfg.run_once {
        runner.run(cfg.cycle_interval_secs, true).await;
        info!("RUN_ONCE set, exiting after one cycle");
        return Ok(());
    }

    // Cycle runner (background, every CYCLE_INTERVAL_SECS)
    let interval_secs = cfg.cycle_interval_secs;
    tokio::spawn(async move { runner.run(interval_secs, false).await });

    // HTTP API server
    let api_state = ApiState {
        store,
        policy: cfg.policy.clone(),
        snapshot,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

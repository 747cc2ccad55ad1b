//! Market post alerts: binary entrypoint.
//! Boots the Axum HTTP service on Shuttle, wiring the poller, the trigger
//! routes and the Prometheus endpoint, plus an optional in-process schedule.

use market_post_alerts::{
    api::{self, AppState},
    bootstrap::Runtime,
    config::AppConfig,
    ingest::scheduler::spawn_scheduler,
    metrics::Metrics,
};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_post_alerts=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    // Shuttle may already have installed a subscriber; keep theirs if so.
    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::from_env()?;
    let runtime = Runtime::from_config(&cfg)?;
    let metrics = Metrics::init()?;

    if runtime.poll_interval_secs > 0 {
        tracing::info!(interval_secs = runtime.poll_interval_secs, "in-process scheduler enabled");
        spawn_scheduler(runtime.poller.clone(), runtime.poll_interval_secs);
    }

    let state = AppState::new(runtime.poller.clone(), runtime.cron_secret.clone());
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}

mod api;
mod config;
mod engine;
mod fetch;
mod store;

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;

use config::Config;
use engine::models::DateRange;
use fetch::{Fetcher, HttpFetcher};
use store::{AutoRefresh, PanelStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(config.fetch_base_url.clone()));
    info!("Using fetch collaborator at {}", config.fetch_base_url);

    // Initial global window, counted back from startup
    let now = Utc::now();
    let global_range = DateRange::new(now - Duration::days(config.default_range_days), now);

    let store = Arc::new(PanelStore::new(
        Arc::clone(&fetcher),
        config.dashboard.panels.clone(),
        config.dashboard.event_catalog(),
        global_range,
    ));
    info!(
        "Configured {} panel(s), {} catalog event(s)",
        config.dashboard.panels.len(),
        config.dashboard.events.len()
    );

    let auto_refresh = Arc::new(AutoRefresh::new(Arc::clone(&store)));
    if config.auto_refresh_secs > 0 {
        auto_refresh.set_interval(config.auto_refresh_secs).await;
    }

    let router = api::create_api_router(store, auto_refresh, fetcher);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Dashboard API listening on http://{}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}

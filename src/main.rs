mod cache;
mod catalog;
mod config;
mod db;
mod error;
mod fetch;
mod iplayer;
mod models;
mod playlist;
mod routes;
mod state;
#[cfg(test)]
mod testing;

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    catalog::Catalog,
    db::SqliteStore,
    fetch::ReqwestClient,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "iplayer_catalog=info,tower_http=info".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // ── Config ───────────────────────────────────────────────────────────────
    let config = Arc::new(config::AppConfig::from_env()?);
    info!("Starting iplayer-catalog, binding to {}", config.bind);

    // ── Database ─────────────────────────────────────────────────────────────
    let db = db::connect(&config).await?;
    let store = Arc::new(SqliteStore::new(db));

    // ── Catalogue ────────────────────────────────────────────────────────────
    let client = Arc::new(ReqwestClient::new(
        &config.user_agent,
        Duration::from_secs(config.request_timeout_secs),
        config.proxy.as_deref(),
    )?);
    let catalog = Arc::new(Catalog::new(client, store, config.catalog_settings()));
    catalog.restore().await;

    if let Err(e) = catalog.refresh_categories().await {
        warn!("Initial category refresh failed: {e}");
    }
    if let Err(e) = catalog.refresh_programmes().await {
        warn!("Initial programme refresh failed: {e}");
    }

    // ── Scheduled refreshes ──────────────────────────────────────────────────
    // Startup already refreshed, so each ticker first fires one period later.
    every(config.category_refresh_secs, {
        let catalog = Arc::clone(&catalog);
        move || {
            let catalog = Arc::clone(&catalog);
            async move {
                info!("Refreshing categories…");
                if let Err(e) = catalog.refresh_categories().await {
                    warn!("Category refresh failed: {e}");
                }
            }
        }
    });
    every(config.programme_refresh_secs, {
        let catalog = Arc::clone(&catalog);
        move || {
            let catalog = Arc::clone(&catalog);
            async move {
                info!("Refreshing programmes…");
                if let Err(e) = catalog.refresh_programmes().await {
                    warn!("Programme refresh failed: {e}");
                }
            }
        }
    });
    every(config.stream_cache_clear_secs, {
        let catalog = Arc::clone(&catalog);
        move || {
            let catalog = Arc::clone(&catalog);
            async move { catalog.clear_streams().await }
        }
    });

    // ── HTTP server ───────────────────────────────────────────────────────────
    let state = AppState {
        config: Arc::clone(&config),
        catalog,
    };
    let router = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", config.bind);

    axum::serve(listener, router).await?;

    Ok(())
}

/// Run `job` every `secs` seconds, starting one period from now.
fn every<F, Fut>(secs: u64, mut job: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = Duration::from_secs(secs.max(1));
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        loop {
            interval.tick().await;
            job().await;
        }
    });
}

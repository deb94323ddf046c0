// =============================================================================
// candlewatch — Main Entry Point
// =============================================================================
//
// Intraday candle-scan dashboard backend: polls one trading day of five-minute
// bars for the selected symbol groups, flags bars whose open sits on the low
// and close on the high, and serves the results to a browser dashboard over
// REST + WebSocket.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod credstore;
mod market_data;
mod marubozu_detector;
mod refresh;
mod runtime_config;
mod yahoo;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::refresh::RefreshLoop;
use crate::runtime_config::RuntimeConfig;
use crate::yahoo::YahooClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("candlewatch starting up");

    let mut config = RuntimeConfig::load("runtime_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override selected groups from env if available.
    if let Ok(groups) = std::env::var("CANDLEWATCH_GROUPS") {
        config.selected_groups = groups
            .split(',')
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
    }
    config
        .selected_groups
        .retain(|name| {
            let known = config.symbol_groups.iter().any(|g| &g.name == name);
            if !known {
                warn!(group = %name, "Unknown group in selection — dropped");
            }
            known
        });

    info!(
        groups = config.symbol_groups.len(),
        selected = ?config.selected_groups,
        interval_secs = config.refresh_interval_secs,
        "Configured symbol groups"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // Optional operator bootstrap: CANDLEWATCH_SEED_USER="name:password"
    // upserts one login into the credential file so a fresh deployment is
    // reachable without hand-editing JSON.
    if let Ok(seed) = std::env::var("CANDLEWATCH_SEED_USER") {
        match seed.split_once(':') {
            Some((username, password)) if !username.is_empty() => {
                let mut users = state.credentials.load();
                users.insert(username.to_string(), password.to_string());
                match state.credentials.save(&users) {
                    Ok(()) => info!(username, "seed user written to credential store"),
                    Err(e) => error!(error = %e, "failed to write seed user"),
                }
            }
            _ => warn!("CANDLEWATCH_SEED_USER must look like 'name:password' — ignored"),
        }
    }

    // ── 3. Build the market-data client ──────────────────────────────────
    let yahoo_client = Arc::new(YahooClient::new());

    // ── 4. Start the scan loop ───────────────────────────────────────────
    let refresh_loop = RefreshLoop::start(state.clone(), yahoo_client);

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("CANDLEWATCH_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("Failed to bind API server");
        info!(addr = %bind_addr, "API server listening");
        axum::serve(listener, app)
            .await
            .expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    refresh_loop.stop().await;

    if let Err(e) = state.runtime_config.read().save("runtime_config.json") {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("candlewatch shut down complete.");
    Ok(())
}

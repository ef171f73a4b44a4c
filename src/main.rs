mod adapter;
mod api_docs;
mod config;
mod controllers;
mod errors;
mod models;
mod routes;
mod services;
mod shared_state;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{response::Html, routing::get, Router};
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_scalar::Scalar;

use crate::adapter::ForecastAdapter;
use crate::api_docs::ApiDoc;
use crate::config::Config;
use crate::controllers::device_controller::ApiState;
use crate::routes::device_routes::api_routes;
use crate::shared_state::DeviceStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let path = std::env::var("NED_CONFIG").unwrap_or_else(|_| "config.json".to_string());
    let (config, config_problem) = Config::load(&path).with_context(|| format!("failed to read {}", path))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.debug_level.filter())),
        )
        .init();
    info!("configuration loaded from {}", path);
    config.dump_to_log();

    // 2. Device store, mirrored to MQTT when enabled
    let (mirror_tx, mirror_rx) = tokio::sync::mpsc::unbounded_channel();
    let store = if config.mqtt.is_active() {
        DeviceStore::new().with_mirror(mirror_tx)
    } else {
        drop(mirror_tx);
        DeviceStore::new()
    };
    tokio::spawn(services::mqtt_service::run_publisher(config.mqtt.clone(), mirror_rx));

    // 3. Adapter: startup cycle, then one tick per interval
    let mut adapter = match config_problem {
        Some(e) => ForecastAdapter::degraded(&config, e, store.clone()),
        None => ForecastAdapter::new(&config, store.clone()),
    };
    let api_state = ApiState { store, status: adapter.status_handle() };
    let tick_every = Duration::from_secs(config.tick_interval_secs.max(1));

    tokio::spawn(async move {
        adapter.on_start(Utc::now()).await;
        let mut interval = tokio::time::interval(tick_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            adapter.tick(Utc::now()).await;
        }
    });

    // 4. Read-only HTTP API
    let app = Router::new()
        .nest("/api", api_routes(api_state))
        .route("/scalar", get(|| async { Html(Scalar::new(ApiDoc::openapi()).to_html()) }))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("API server listening on http://{}", addr);
    info!("Scalar UI: http://{}/scalar", addr);

    axum_server::bind(addr)
        .serve(app.into_make_service())
        .await
        .context("HTTP server failed")?;

    Ok(())
}

use std::collections::HashMap;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use cyberquest_backend::api;
use cyberquest_backend::catalog::Catalog;
use cyberquest_backend::config::Config;
use cyberquest_backend::engine::{GameEngine, Rules};
use cyberquest_backend::metrics;
use cyberquest_backend::sweeper;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "cyberquest-backend" }))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::load();
    metrics::register_metrics();

    // A bad catalog prevents the service from serving traffic at all.
    let catalogs = match Catalog::load_dir(&config.data_dir) {
        Ok(catalogs) if !catalogs.is_empty() => catalogs,
        Ok(_) => {
            tracing::error!("No catalogs found in {}", config.data_dir.display());
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Failed to load catalogs: {e}");
            std::process::exit(1);
        }
    };

    let rules = Rules {
        win_at: config.win_at,
        lose_at: config.lose_at,
    };

    let mut games: api::EngineMap = HashMap::new();
    for catalog in catalogs {
        tracing::info!(
            catalog = %catalog.name,
            mode = %catalog.mode,
            items = catalog.len(),
            "Loaded catalog"
        );
        games.insert(
            catalog.name.clone(),
            Arc::new(GameEngine::new(Arc::new(catalog), rules)),
        );
    }
    let games = Arc::new(games);

    if let Some(secs) = config.session_idle_timeout_secs {
        sweeper::spawn_idle_sweeper(games.clone(), chrono::Duration::seconds(secs as i64));
    }

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api::router(games))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("Failed to bind port");

    tracing::info!("CyberQuest backend listening on port {}", config.port);
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

//! Reels Recommender - cluster-affinity short-video recommendations
//!
//! Port: 8082

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use reels_recommender::{
    server::{configure_routes, AppState},
    RecommenderConfig,
};
use tracing::{info, warn};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = RecommenderConfig::load().context("Failed to load recommender configuration")?;
    info!(
        "Starting Reels Recommender on {}:{}",
        config.bind_address, config.port
    );

    let bind = (config.bind_address.clone(), config.port);
    let workers = config.workers;
    let state = web::Data::new(
        AppState::load(config).context("Failed to open user profile store")?,
    );
    if state.artifacts.any_corrupt() {
        warn!("Serving degraded: {:?}", state.artifacts);
    }

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_routes)
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    server
        .bind(bind)
        .context("Failed to bind HTTP listener")?
        .run()
        .await
        .context("HTTP server error")?;

    info!("Reels Recommender stopped");
    Ok(())
}

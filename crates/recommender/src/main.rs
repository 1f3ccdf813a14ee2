//! Book recommendation service
//!
//! Port: 8082

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use bookrec_engine::server::{configure, AppState};
use bookrec_engine::{
    init_logging, load_dotenv, load_interactions, AlsConfig, ConfigLoader, ItemCatalog,
    LogConfig, RecommendationEngine, ServiceConfig,
};
use std::sync::Arc;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let log_config = LogConfig::from_env()?;
    init_logging(&log_config)?;

    let als_config = AlsConfig::from_env()?;
    als_config.validate()?;
    let service_config = ServiceConfig::from_env()?;
    service_config.validate()?;

    info!(
        factors = als_config.factors,
        regularization = als_config.regularization,
        iterations = als_config.iterations,
        "Starting book recommendation service"
    );

    let interactions = load_interactions(&service_config.interactions_path)
        .context("failed to read interaction feed")?;
    let catalog = ItemCatalog::load(&service_config.items_path)
        .context("failed to read item catalog")?;

    let engine = RecommendationEngine::new(als_config).with_model_path(&service_config.model_path);

    let summary = if service_config.retrain || !service_config.model_path.exists() {
        info!(path = %service_config.model_path.display(), "Training model from scratch");
        engine.train_from_scratch(&interactions)
    } else {
        info!(path = %service_config.model_path.display(), "Loading persisted model");
        engine.load(&service_config.model_path, &interactions)
    }
    .context("failed to prepare model")?;

    info!(
        users = summary.users,
        items = summary.items,
        nnz = summary.nnz,
        "Model ready"
    );

    let state = web::Data::new(AppState {
        engine: Arc::new(engine),
        catalog: Arc::new(catalog),
        home_user: service_config.home_user,
        default_count: service_config.default_count,
        max_count: service_config.max_count,
    });

    info!(
        host = %service_config.host,
        port = service_config.port,
        workers = service_config.workers,
        "Listening"
    );

    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .workers(service_config.workers)
        .bind((service_config.host.as_str(), service_config.port))?
        .run()
        .await?;

    Ok(())
}

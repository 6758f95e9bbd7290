use anyhow::Result;
use sandwich_stats::{config, db, service::SandwichService, web};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    let config = config::Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting Sandwich Stats...");

    // Initialize database
    let db = db::Database::new(&config.database).await?;
    if config.database.create_schema {
        db.run_migrations(&config.schema()?, &config.table_names()?).await?;
    }
    info!("Database initialized");

    let service = Arc::new(SandwichService::from_config(Arc::new(db), &config)?);
    let lists = service.filter_lists();
    info!(
        "Filter lists version {} ({} stable tokens, {} public routers)",
        lists.version,
        lists.stable_tokens.len(),
        lists.public_routers.len()
    );

    // Warm the cache for the default dashboard views
    if config.cache.warm_on_start {
        service.warm_cache().await;
    }

    web::start_server(&config, service).await?;

    Ok(())
}

//! Web server module

mod error;
mod routes;

pub use error::AppError;

use anyhow::Result;
use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::service::SandwichService;

pub struct AppState {
    pub service: Arc<SandwichService>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/sandwich/stats", get(routes::api_stats))
        .route("/api/sandwich/chart", get(routes::api_chart))
        .route("/api/sandwich/builders/:builder", get(routes::api_builder_sandwiches))
        .route("/api/sandwich/search", get(routes::api_search))
        // Access control for admin routes lives in front of this service
        .route("/api/admin/cache/clear", post(routes::api_clear_cache))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: &Config, service: Arc<SandwichService>) -> Result<()> {
    let app = router(Arc::new(AppState { service }));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

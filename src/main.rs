//! ga-reports - Google Analytics report bridge

mod db;
mod error;
mod models;
mod query;
mod routes;
mod services;
mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::Database;
use crate::routes::{fields, health, metrics, reports};
use crate::services::ga::{GoogleAnalyticsClient, DEFAULT_METADATA_URL, DEFAULT_REPORTS_URL};
use crate::state::AppState;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ga_reports=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration
    let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()
        .expect("Invalid LISTEN_ADDR");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://ga_reports.db".to_string());

    let metadata_url =
        std::env::var("GA_METADATA_URL").unwrap_or_else(|_| DEFAULT_METADATA_URL.to_string());

    let reports_url =
        std::env::var("GA_REPORTS_URL").unwrap_or_else(|_| DEFAULT_REPORTS_URL.to_string());

    let access_token = std::env::var("GA_ACCESS_TOKEN")
        .ok()
        .filter(|token| !token.is_empty());

    // Open the catalog database
    let db = match Database::new(&database_url).await {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "Failed to open catalog database");
            std::process::exit(1);
        }
    };

    if access_token.is_none() {
        warn!("GA_ACCESS_TOKEN not set; reports render empty until the account is authorized");
    }

    // Build the remote feed client
    let feed = match GoogleAnalyticsClient::new(
        metadata_url.clone(),
        reports_url.clone(),
        access_token,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build analytics client");
            std::process::exit(1);
        }
    };

    // Create application state
    let state = AppState::new(db, feed);

    // Build router
    let app = Router::new()
        // Health and metrics (probes + Prometheus)
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::prometheus_metrics))
        // Field catalog and admin sync actions
        .route("/api/v1/fields", get(fields::list_fields))
        .route("/api/v1/fields/check-updates", post(fields::check_updates))
        .route("/api/v1/fields/import", post(fields::import_fields))
        // Report execution
        .route("/api/v1/reports/query", post(reports::run_report))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    info!(
        "ga-reports v{} starting on {}",
        env!("CARGO_PKG_VERSION"),
        listen_addr
    );
    info!("Catalog database: {}", database_url);
    info!("Metadata endpoint: {}", metadata_url);
    info!("Reporting endpoint: {}", reports_url);

    // Start server
    let listener = tokio::net::TcpListener::bind(listen_addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

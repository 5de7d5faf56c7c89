//! mw-tracker - visitor tracking web app
//!
//! Serves the site pages and records visitor activity:
//! - Cookie-backed sessions
//! - IP geolocation through an external lookup service
//! - Pageviews, searches and client events appended to a JSON-lines log

mod analytics;
mod config;
mod error;
mod events;
mod geoip;
mod web;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging; RUST_LOG overrides the configured level.
    // Use LOG_FORMAT=gcp (or logging.format = "gcp") for structured GCP Cloud Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.logging.format.clone());
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("Starting mw-tracker...");
    info!("Configuration loaded");

    let state = web::AppState::new(config)?;
    info!("Activity log: {}", state.activity.path().display());

    // Start web server (blocking)
    web::start_server(state).await?;

    Ok(())
}

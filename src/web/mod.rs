//! Web server module

mod middleware;
mod pages;
mod routes;
mod session;

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::{any::Any, net::SocketAddr, sync::Arc};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::events::ActivityLog;
use crate::geoip::GeoLookup;

use session::SessionCookies;

/// Shared per-process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub geo: GeoLookup,
    pub activity: ActivityLog,
    pub sessions: SessionCookies,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let geo = GeoLookup::new(&config.geo)?;
        let activity = ActivityLog::open(&config.activity);
        let sessions = SessionCookies::new(&config.session);

        Ok(Self {
            config: Arc::new(config),
            geo,
            activity,
            sessions,
        })
    }
}

/// Turn a handler panic into a JSON error instead of a dropped connection
fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Handler panicked: {}", detail);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "ip": "unknown", "error": "internal server error" })),
    )
        .into_response()
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();

    Router::new()
        // Pages (pageview logged)
        .route("/", get(routes::index))
        .route("/mw", get(routes::mw))
        .route("/analytics", get(routes::analytics_page))
        // API endpoints
        .route("/get-ip", get(routes::get_ip))
        .route("/get_user_ip", get(routes::get_user_ip))
        .route("/log-event", post(routes::log_event))
        .route("/admin/analytics-data", post(routes::analytics_data))
        // Every route above gets a session
        .route_layer(middleware::SessionLayer::new(state.sessions.clone()))
        // Static files (no session)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

pub async fn start_server(state: AppState) -> Result<()> {
    let config = state.config.clone();
    let app = app(state);

    let bind = format!("{}:{}", config.server.host, config.server.http_port);
    let addr = tokio::net::lookup_host(&bind)
        .await?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Cannot resolve bind address {}", bind))?;

    if config.tls_enabled() {
        // reqwest and axum-server pull in different rustls backends; pick one
        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &config.server.tls_cert,
            &config.server.tls_key,
        )
        .await?;
        info!("Web server starting on https://{}", addr);
        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await?;
    } else {
        info!("Web server starting on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests;

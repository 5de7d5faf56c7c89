//! HTTP route handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Html,
    Json,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::middleware::{forwarded_ip, RequestContext};
use super::pages::{self, VisitorView};
use super::AppState;
use crate::analytics::{AnalyticsSummary, DateRange};
use crate::error::AppError;
use crate::events::{now_iso, ActivityEvent, SearchFilters};
use crate::geoip::GeoRecord;

/// Log a pageview for the current request
async fn track_pageview(state: &AppState, ctx: &RequestContext) {
    let event = ActivityEvent::pageview(
        ctx.session_id().to_string(),
        ctx.ip.clone(),
        ctx.user_agent.clone(),
        ctx.referrer.clone(),
        ctx.path.clone(),
    );
    state.activity.record(event).await;
}

/// Landing page
pub async fn index(State(state): State<AppState>, ctx: RequestContext) -> Html<String> {
    track_pageview(&state, &ctx).await;
    let geo = state.geo.lookup(&ctx.ip).await;

    Html(pages::index(&VisitorView {
        ip: &ctx.ip,
        geo: &geo,
        session_id: ctx.session_id(),
    }))
}

/// Search page; a non-empty `query` parameter is logged as a search.
/// Repeated keys keep their first value.
pub async fn mw(
    State(state): State<AppState>,
    ctx: RequestContext,
    query: Option<Query<Vec<(String, String)>>>,
) -> Html<String> {
    let search = query
        .map(|Query(pairs)| SearchFilters::from_pairs(&pairs))
        .unwrap_or_default();
    track_pageview(&state, &ctx).await;
    let geo = state.geo.lookup(&ctx.ip).await;

    if search.is_search() {
        let event = ActivityEvent::search(ctx.session_id().to_string(), ctx.ip.clone(), &search);
        state.activity.record(event).await;
    }

    Html(pages::mw(
        &VisitorView {
            ip: &ctx.ip,
            geo: &geo,
            session_id: ctx.session_id(),
        },
        &search.query,
    ))
}

/// Analytics dashboard shell; data comes from `/admin/analytics-data`
pub async fn analytics_page(State(state): State<AppState>, ctx: RequestContext) -> Html<String> {
    track_pageview(&state, &ctx).await;
    let geo = state.geo.lookup(&ctx.ip).await;

    Html(pages::analytics(&VisitorView {
        ip: &ctx.ip,
        geo: &geo,
        session_id: ctx.session_id(),
    }))
}

#[derive(Debug, Serialize)]
pub struct IpResponse {
    pub ip: String,
    pub geo: GeoRecord,
    pub session_id: String,
}

/// API: client IP, location and session id
pub async fn get_ip(State(state): State<AppState>, ctx: RequestContext) -> Json<IpResponse> {
    let geo = state.geo.lookup(&ctx.ip).await;

    Json(IpResponse {
        session_id: ctx.session_id().to_string(),
        ip: ctx.ip,
        geo,
    })
}

#[derive(Debug, Serialize)]
pub struct UserIpResponse {
    pub ip: String,
    pub geo: GeoRecord,
    pub timestamp: String,
}

/// API: legacy IP endpoint using plain X-Forwarded-For resolution
pub async fn get_user_ip(
    State(state): State<AppState>,
    ctx: RequestContext,
    headers: axum::http::HeaderMap,
) -> Json<UserIpResponse> {
    let ip = forwarded_ip(&headers, ctx.remote_addr);
    let geo = state.geo.lookup(&ip).await;

    Json(UserIpResponse {
        ip,
        geo,
        timestamp: now_iso(),
    })
}

#[derive(Debug, Serialize)]
pub struct LogEventResponse {
    pub success: bool,
}

/// API: log a client-side event
///
/// The body is parsed by hand so malformed input is reported in the JSON
/// body instead of as an extractor rejection.
pub async fn log_event(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Json<LogEventResponse>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::MissingBody);
    }
    let value: Value =
        serde_json::from_slice(&body).map_err(|e| AppError::MalformedBody(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(AppError::InvalidEvent("body must be a JSON object".to_string()));
    };

    let event = ActivityEvent::from_client(fields, ctx.session_id().to_string(), ctx.ip.clone())
        .map_err(AppError::InvalidEvent)?;
    state.activity.append(&event).await?;

    Ok(Json(LogEventResponse { success: true }))
}

#[derive(Debug, Serialize)]
pub struct AnalyticsDataResponse {
    pub success: bool,
    pub data: AnalyticsSummary,
}

/// API: dashboard data. Returns the sample aggregates for any range.
pub async fn analytics_data(body: Bytes) -> Json<AnalyticsDataResponse> {
    let range: DateRange = serde_json::from_slice(&body).unwrap_or_default();
    debug!(start = ?range.start_date, end = ?range.end_date, "Serving sample analytics");

    Json(AnalyticsDataResponse {
        success: true,
        data: AnalyticsSummary::sample(),
    })
}

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    response::Response,
    Extension, Router,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use tempfile::TempDir;
use tower::ServiceExt; // for `app.oneshot(...)`

use super::{app, AppState};
use crate::config::test_config;
use crate::events::read_events;

const UNREACHABLE: &str = "http://127.0.0.1:1";

struct TestApp {
    router: Router,
    log_path: PathBuf,
    _dir: TempDir,
}

impl TestApp {
    fn new(geo_url: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("user_analytics.log");
        let config = test_config(&log_path.to_string_lossy(), geo_url);
        let router = app(AppState::new(config).unwrap());

        Self {
            router,
            log_path,
            _dir: dir,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn events(&self) -> Vec<Value> {
        read_events(&self.log_path).await
    }
}

fn get(uri: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(uri)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// `name=value` part of the response's session cookie
fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn unknown_geo() -> Value {
    json!({
        "country": "Unknown",
        "region": "Unknown",
        "city": "Unknown",
        "latitude": 0.0,
        "longitude": 0.0
    })
}

#[tokio::test]
async fn get_ip_uses_first_forwarded_entry() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/1.2.3.4/json/");
            then.status(200).json_body(json!({
                "country_name": "Australia",
                "region": "Queensland",
                "city": "Brisbane",
                "latitude": -27.47,
                "longitude": 153.02
            }));
        })
        .await;
    let app = TestApp::new(&server.base_url());

    let response = app
        .send(
            get("/get-ip")
                .header("X-Forwarded-For", "1.2.3.4, 5.6.7.8")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_some());
    let json = json_body(response).await;
    mock.assert_async().await;
    assert_eq!(json["ip"], "1.2.3.4");
    assert_eq!(json["geo"]["country"], "Australia");
    assert_eq!(json["geo"]["city"], "Brisbane");
    assert_eq!(json["geo"]["latitude"], -27.47);
    assert!(!json["session_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn get_ip_survives_unreachable_geolocation() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(get("/get-ip").header("X-Forwarded-For", "8.8.8.8").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ip"], "8.8.8.8");
    assert_eq!(json["geo"], unknown_geo());
}

#[tokio::test]
async fn get_ip_survives_geolocation_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/8.8.4.4/json/");
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({ "country_name": "Too Late" }));
        })
        .await;
    let app = TestApp::new(&server.base_url());

    let response = app
        .send(get("/get-ip").header("X-Forwarded-For", "8.8.4.4").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["geo"], unknown_geo());
}

#[tokio::test]
async fn connection_address_is_used_without_forwarded_header() {
    let app = TestApp::new(UNREACHABLE);
    let router = app
        .router
        .clone()
        .layer(Extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))));

    let response = router
        .oneshot(get("/get-ip").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = json_body(response).await;
    assert_eq!(json["ip"], "127.0.0.1");
    assert_eq!(json["geo"], unknown_geo());
}

#[tokio::test]
async fn session_is_stable_across_requests() {
    let app = TestApp::new(UNREACHABLE);

    let first = app.send(get("/get-ip").body(Body::empty()).unwrap()).await;
    let cookie = session_cookie(&first).expect("new session sets a cookie");
    let first_id = json_body(first).await["session_id"].clone();

    for _ in 0..3 {
        let again = app
            .send(get("/get-ip").header(header::COOKIE, &cookie).body(Body::empty()).unwrap())
            .await;
        assert!(session_cookie(&again).is_none());
        assert_eq!(json_body(again).await["session_id"], first_id);
    }
}

#[tokio::test]
async fn cookieless_requests_get_distinct_sessions() {
    let app = TestApp::new(UNREACHABLE);

    let a = json_body(app.send(get("/get-ip").body(Body::empty()).unwrap()).await).await;
    let b = json_body(app.send(get("/get-ip").body(Body::empty()).unwrap()).await).await;

    assert_ne!(a["session_id"], b["session_id"]);
}

#[tokio::test]
async fn landing_page_logs_pageview() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(
            get("/")
                .header(header::USER_AGENT, "test-agent/1.0")
                .header(header::REFERER, "https://example.com/")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = text_body(response).await;
    assert!(html.contains("Welcome"));

    let events = app.events().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["event_type"], "pageview");
    assert_eq!(event["ip"], "unknown");
    assert_eq!(event["user_agent"], "test-agent/1.0");
    assert_eq!(event["referrer"], "https://example.com/");
    assert_eq!(event["path"], "/");
    assert!(html.contains(event["session_id"].as_str().unwrap()));
    assert!(event["timestamp"].is_string());
}

#[tokio::test]
async fn pageview_defaults_without_headers() {
    let app = TestApp::new(UNREACHABLE);

    app.send(get("/analytics").body(Body::empty()).unwrap()).await;

    let events = app.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["path"], "/analytics");
    assert_eq!(events[0]["user_agent"], "Unknown");
    assert_eq!(events[0]["referrer"], "Direct");
}

#[tokio::test]
async fn mw_search_logs_one_search_event() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(get("/mw?query=coffee&searchType=Business").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = app.events().await;
    let searches: Vec<&Value> = events.iter().filter(|e| e["event_type"] == "search").collect();
    assert_eq!(searches.len(), 1);
    let search = searches[0];
    assert_eq!(search["search_query"], "coffee");
    assert_eq!(search["search_type"], "Business");
    assert_eq!(search["category"], "");
    assert_eq!(search["rating"], "");
    assert_eq!(search["radius"], "");
    assert_eq!(search["ip"], "unknown");
    assert_eq!(search["session_id"], events[0]["session_id"]);
    assert_eq!(events[0]["event_type"], "pageview");
}

#[tokio::test]
async fn mw_without_query_logs_only_pageview() {
    let app = TestApp::new(UNREACHABLE);

    app.send(get("/mw?category=food").body(Body::empty()).unwrap()).await;
    app.send(get("/mw?query=").body(Body::empty()).unwrap()).await;

    let events = app.events().await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e["event_type"] == "pageview"));
}

#[tokio::test]
async fn mw_repeated_query_keys_use_first_value() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(get("/mw?query=coffee&query=tea&searchType=Business").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = app.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "pageview");
    assert_eq!(events[1]["event_type"], "search");
    assert_eq!(events[1]["search_query"], "coffee");
    assert_eq!(events[1]["search_type"], "Business");
}

#[tokio::test]
async fn log_event_appends_client_event() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/log-event")
                .header("Content-Type", "application/json")
                .header("X-Forwarded-For", "1.2.3.4")
                .body(Body::from(r#"{"event_type":"click","target":"button1"}"#))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "success": true }));

    let events = app.events().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["event_type"], "click");
    assert_eq!(event["target"], "button1");
    assert_eq!(event["ip"], "1.2.3.4");
    assert!(!event["session_id"].as_str().unwrap().is_empty());
    assert_ne!(event["session_id"], "unknown");
    assert!(event["timestamp"].is_string());
}

#[tokio::test]
async fn log_event_keeps_numeric_timestamp() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(post_json(
            "/log-event",
            r#"{"event_type":"click","target":"b","timestamp":1700000000000}"#,
        ))
        .await;
    assert_eq!(json_body(response).await, json!({ "success": true }));

    let events = app.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["timestamp"], json!(1700000000000u64));
    assert_eq!(events[0]["target"], "b");
}

#[tokio::test]
async fn log_event_uses_cookie_session() {
    let app = TestApp::new(UNREACHABLE);
    let first = app.send(get("/get-ip").body(Body::empty()).unwrap()).await;
    let cookie = session_cookie(&first).unwrap();
    let session_id = json_body(first).await["session_id"].clone();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/log-event")
                .header(header::COOKIE, &cookie)
                .body(Body::from(r#"{"event_type":"scroll","session_id":"forged"}"#))
                .unwrap(),
        )
        .await;

    assert_eq!(json_body(response).await["success"], true);
    assert_eq!(app.events().await[0]["session_id"], session_id);
}

#[tokio::test]
async fn log_event_reports_bad_bodies() {
    let app = TestApp::new(UNREACHABLE);

    for body in ["", "{not json", "[1, 2]", r#"{"target":"button1"}"#] {
        let response = app.send(post_json("/log-event", body)).await;
        assert_eq!(response.status(), StatusCode::OK, "body {body:?}");
        let json = json_body(response).await;
        assert_eq!(json["success"], false, "body {body:?}");
        assert!(json["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    assert!(app.events().await.is_empty());
}

#[tokio::test]
async fn analytics_data_ignores_date_range() {
    let app = TestApp::new(UNREACHABLE);

    let mut payloads = Vec::new();
    for body in ["{}", r#"{"startDate":"2020-01-01","endDate":"2020-01-31"}"#, ""] {
        let response = app.send(post_json("/admin/analytics-data", body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        payloads.push(json["data"].clone());
    }

    assert_eq!(payloads[0], payloads[1]);
    assert_eq!(payloads[1], payloads[2]);
    assert_eq!(payloads[0]["visitors"]["total"], 256);
    assert_eq!(payloads[0]["countries"]["Canada"], 45);
    assert_eq!(payloads[0]["searches"][1]["term"], "coffee shops");
    assert!(app.events().await.is_empty());
}

#[tokio::test]
async fn get_user_ip_returns_timestamped_lookup() {
    let app = TestApp::new(UNREACHABLE);

    let response = app
        .send(
            get("/get_user_ip")
                .header("X-Forwarded-For", "1.2.3.4, 5.6.7.8")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["ip"], "1.2.3.4");
    assert_eq!(json["geo"], unknown_geo());
    assert!(chrono::DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
    assert!(json.get("session_id").is_none());
}

#[tokio::test]
async fn unwritable_log_does_not_fail_pages() {
    let dir = tempfile::tempdir().unwrap();
    // The log path is a directory, so every append fails
    let config = test_config(&dir.path().to_string_lossy(), UNREACHABLE);
    let router = app(AppState::new(config).unwrap());

    let page = router
        .clone()
        .oneshot(get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);

    let response = router
        .oneshot(post_json("/log-event", r#"{"event_type":"click"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("activity log"));
}

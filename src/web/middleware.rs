//! Per-request session tracking middleware
//!
//! Every routed request gets a session (minted and cookied when missing) and
//! a [`RequestContext`] in its extensions carrying the client IP and the
//! headers the activity log needs.

use axum::{
    async_trait,
    body::Body,
    extract::{ConnectInfo, FromRequestParts},
    http::{header, request::Parts, HeaderMap, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    convert::Infallible,
    net::SocketAddr,
    task::{Context, Poll},
};
use tower::{Layer, Service};

use super::session::{Session, SessionCookies};

const UNKNOWN_IP: &str = "unknown";

/// Get the client IP address: first X-Forwarded-For entry, then the
/// connection address, then `"unknown"`
pub fn client_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    // X-Forwarded-For may contain a chain of IPs, first is the original client
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(ips) = forwarded.to_str() {
            if let Some(first_ip) = ips.split(',').next() {
                let ip = first_ip.trim();
                if !ip.is_empty() {
                    return ip.to_string();
                }
            }
        }
    }

    remote_addr
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

/// Simpler resolution kept for `/get_user_ip`: the header value (or the
/// remote address when the header is absent), cut at the first comma.
pub fn forwarded_ip(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> String {
    let remote = remote_addr.map(|addr| addr.ip().to_string());
    let raw = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| remote.clone())
        .unwrap_or_default();

    let first = raw.split(',').next().unwrap_or_default().trim();
    if !first.is_empty() {
        return first.to_string();
    }
    remote.unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn header_or(headers: &HeaderMap, name: header::HeaderName, default: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Request data handlers need, resolved once by the middleware
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub ip: String,
    pub remote_addr: Option<SocketAddr>,
    pub session: Option<Session>,
    pub user_agent: String,
    pub referrer: String,
    pub path: String,
}

impl RequestContext {
    fn from_parts(
        headers: &HeaderMap,
        remote_addr: Option<SocketAddr>,
        path: &str,
        session: Option<Session>,
    ) -> Self {
        Self {
            ip: client_ip(headers, remote_addr),
            remote_addr,
            session,
            user_agent: header_or(headers, header::USER_AGENT, "Unknown"),
            referrer: header_or(headers, header::REFERER, "Direct"),
            path: path.to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        self.session
            .as_ref()
            .map(|s| s.session_id.as_str())
            .unwrap_or("unknown")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ctx) = parts.extensions.get::<RequestContext>() {
            return Ok(ctx.clone());
        }
        // Route not wrapped by the session layer
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self::from_parts(&parts.headers, remote_addr, parts.uri.path(), None))
    }
}

/// Layer that ensures a session on every request
#[derive(Clone)]
pub struct SessionLayer {
    sessions: SessionCookies,
}

impl SessionLayer {
    pub fn new(sessions: SessionCookies) -> Self {
        Self { sessions }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            sessions: self.sessions.clone(),
        }
    }
}

/// Middleware service for session tracking
#[derive(Clone)]
pub struct SessionMiddleware<S> {
    inner: S,
    sessions: SessionCookies,
}

impl<S> Service<Request<Body>> for SessionMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let sessions = self.sessions.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (session, new_cookie) = sessions.ensure(request.headers());

            // Direct connection IP, absent when served without connect info
            let remote_addr = request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            let ctx = RequestContext::from_parts(
                request.headers(),
                remote_addr,
                request.uri().path(),
                Some(session),
            );
            request.extensions_mut().insert(ctx);

            let response = inner.call(request).await?;

            Ok(match new_cookie {
                Some(jar) => (jar, response).into_response(),
                None => response,
            })
        })
    }
}

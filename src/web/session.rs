//! Cookie-backed visitor sessions

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::events::now_iso;

/// Session data carried in the signed cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub first_visit: String,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            first_visit: now_iso(),
        }
    }
}

/// Reads and mints signed session cookies
#[derive(Clone)]
pub struct SessionCookies {
    key: Key,
    cookie_name: Arc<str>,
    max_age: time::Duration,
    secure: bool,
}

impl SessionCookies {
    /// The secret must be at least 32 bytes (checked by `Config::validate`).
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            key: Key::derive_from(config.secret.as_bytes()),
            cookie_name: Arc::from(config.cookie_name.as_str()),
            max_age: time::Duration::days(config.max_age_days),
            secure: config.secure,
        }
    }

    /// Session stored in the request cookies, if present and correctly signed
    pub fn load(&self, headers: &HeaderMap) -> Option<Session> {
        let jar: SignedCookieJar = SignedCookieJar::from_headers(headers, self.key.clone());
        let cookie = jar.get(&self.cookie_name)?;
        match serde_json::from_str::<Session>(cookie.value()) {
            Ok(session) if !session.session_id.is_empty() => Some(session),
            Ok(_) => None,
            Err(e) => {
                debug!("Discarding undecodable session cookie: {}", e);
                None
            }
        }
    }

    /// Return the request's session, minting one when there is none.
    ///
    /// A freshly minted session comes with the jar that must be attached to
    /// the response so the client stores it.
    pub fn ensure(&self, headers: &HeaderMap) -> (Session, Option<SignedCookieJar>) {
        if let Some(session) = self.load(headers) {
            return (session, None);
        }

        let session = Session::new();
        debug!(session_id = %session.session_id, "Minted new session");

        // Session only holds strings, encoding cannot fail
        let value = serde_json::to_string(&session).unwrap_or_default();
        let cookie = Cookie::build((self.cookie_name.to_string(), value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(self.max_age);
        let jar: SignedCookieJar = SignedCookieJar::new(self.key.clone()).add(cookie);

        (session, Some(jar))
    }
}

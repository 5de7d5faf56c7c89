//! Activity events and the append-only JSON-lines log they are written to

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ActivityConfig;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("failed to write activity log: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode activity event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One tracked action, written as a single JSON line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub event_type: String,
    pub session_id: String,
    pub ip: String,
    /// Server-stamped RFC 3339 string, or whatever non-null value a client sent
    pub timestamp: Value,
    /// Event-specific fields, flattened next to the common ones
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Current time in the format every event carries
pub fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

impl ActivityEvent {
    pub fn new(event_type: impl Into<String>, session_id: String, ip: String) -> Self {
        Self {
            event_type: event_type.into(),
            session_id,
            ip,
            timestamp: Value::String(now_iso()),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn pageview(
        session_id: String,
        ip: String,
        user_agent: String,
        referrer: String,
        path: String,
    ) -> Self {
        Self::new("pageview", session_id, ip)
            .with_detail("user_agent", user_agent)
            .with_detail("referrer", referrer)
            .with_detail("path", path)
    }

    pub fn search(session_id: String, ip: String, search: &SearchFilters) -> Self {
        Self::new("search", session_id, ip)
            .with_detail("search_query", search.query.clone())
            .with_detail("search_type", search.search_type.clone())
            .with_detail("category", search.category.clone())
            .with_detail("rating", search.rating.clone())
            .with_detail("radius", search.radius.clone())
    }

    /// Build an event from a client-submitted JSON object.
    ///
    /// `session_id` and `ip` always come from the server. A `timestamp`
    /// supplied by the client is kept as sent; a missing or null one is
    /// stamped with the current time.
    pub fn from_client(
        mut body: Map<String, Value>,
        session_id: String,
        ip: String,
    ) -> Result<Self, String> {
        let event_type = match body.remove("event_type") {
            Some(Value::String(t)) if !t.trim().is_empty() => t,
            Some(Value::String(_)) => return Err("event_type cannot be empty".to_string()),
            Some(_) => return Err("event_type must be a string".to_string()),
            None => return Err("event_type is required".to_string()),
        };
        let timestamp = match body.remove("timestamp") {
            Some(Value::Null) | None => Value::String(now_iso()),
            Some(ts) => ts,
        };
        body.remove("session_id");
        body.remove("ip");

        Ok(Self {
            event_type,
            session_id,
            ip,
            timestamp,
            details: body,
        })
    }
}

/// Search filters read from the `/mw` query string
#[derive(Debug, Clone, PartialEq)]
pub struct SearchFilters {
    pub query: String,
    pub search_type: String,
    pub category: String,
    pub rating: String,
    pub radius: String,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self::from_pairs(&[])
    }
}

impl SearchFilters {
    /// Build filters from decoded query pairs. The first value wins when a
    /// key repeats.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let first = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        Self {
            query: first("query").unwrap_or_default(),
            search_type: first("searchType").unwrap_or_else(|| "unspecified".to_string()),
            category: first("category").unwrap_or_default(),
            rating: first("rating").unwrap_or_default(),
            radius: first("radius").unwrap_or_default(),
        }
    }

    pub fn is_search(&self) -> bool {
        !self.query.is_empty()
    }
}

/// Append-only activity log file
#[derive(Clone)]
pub struct ActivityLog {
    path: Arc<PathBuf>,
    // Serializes appends from this process so lines never interleave
    write_lock: Arc<Mutex<()>>,
}

impl ActivityLog {
    pub fn open(config: &ActivityConfig) -> Self {
        Self {
            path: Arc::new(PathBuf::from(&config.log_file)),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line, creating the file and its directory if needed
    pub async fn append(&self, event: &ActivityEvent) -> Result<(), ActivityError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_path())
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        info!("Logged event: {}", event.event_type);
        Ok(())
    }

    /// Append an event, logging failures instead of returning them
    pub async fn record(&self, event: ActivityEvent) {
        if let Err(e) = self.append(&event).await {
            warn!("Failed to store {} event: {}", event.event_type, e);
        }
    }
}

#[cfg(test)]
pub(crate) async fn read_events(path: &Path) -> Vec<Value> {
    match fs::read_to_string(path).await {
        Ok(contents) => contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect(),
        Err(_) => Vec::new(),
    }
}

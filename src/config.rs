//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Shortest secret `Key::derive_from` accepts
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub geo: GeoConfig,
    pub activity: ActivityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    #[serde(default)]
    pub tls_cert: String,
    #[serde(default)]
    pub tls_key: String,
    /// Directory served under `/static`
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Signing secret for the session cookie
    pub secret: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,
    /// Mark the cookie `Secure` (set when served behind HTTPS)
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base URL of the lookup service, queried as `{service_url}/{ip}/json/`
    pub service_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    pub log_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_cookie_name() -> String {
    "mw_session".to_string()
}

fn default_max_age_days() -> i64 {
    31
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_log_format() -> String {
    "text".to_string()
}

impl GeoConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("MW_TRACKER_CONFIG").unwrap_or_else(|_| "config.toml".to_string());

        let builder = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.http_port", 5000)?
            .set_default("session.secret", "")?
            .set_default("geo.service_url", "https://ipapi.co")?
            .set_default("activity.log_file", "logs/user_analytics.log")?
            .set_default("logging.level", "info")?
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(
                config::Environment::with_prefix("MW_TRACKER")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate server config
        if self.server.http_port == 0 {
            anyhow::bail!("Invalid http_port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        // Validate TLS (both or neither must be set)
        let has_cert = !self.server.tls_cert.is_empty();
        let has_key = !self.server.tls_key.is_empty();
        if has_cert != has_key {
            anyhow::bail!(
                "TLS configuration incomplete: both tls_cert and tls_key must be set, or neither"
            );
        }

        // Validate session config
        if self.session.secret.len() < MIN_SECRET_LEN {
            anyhow::bail!(
                "Session secret must be at least {} bytes (got {})",
                MIN_SECRET_LEN,
                self.session.secret.len()
            );
        }
        if self.session.cookie_name.is_empty() {
            anyhow::bail!("Session cookie name cannot be empty");
        }

        // Validate geolocation config
        if self.geo.enabled && self.geo.service_url.is_empty() {
            anyhow::bail!("Geolocation service_url cannot be empty while geolocation is enabled");
        }
        if self.geo.timeout_secs == 0 {
            anyhow::bail!("Invalid geo timeout_secs: 0 is not allowed");
        }

        // Validate activity log
        if self.activity.log_file.is_empty() {
            anyhow::bail!("Activity log_file cannot be empty");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }
        let valid_formats = ["text", "gcp"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Invalid logging format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        !self.server.tls_cert.is_empty() && !self.server.tls_key.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_config(log_file: &str, geo_url: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            http_port: 5000,
            tls_cert: String::new(),
            tls_key: String::new(),
            static_dir: default_static_dir(),
        },
        session: SessionConfig {
            secret: "test-secret-that-is-long-enough-for-signing".to_string(),
            cookie_name: default_cookie_name(),
            max_age_days: default_max_age_days(),
            secure: false,
        },
        geo: GeoConfig {
            enabled: true,
            service_url: geo_url.to_string(),
            timeout_secs: 1,
        },
        activity: ActivityConfig {
            log_file: log_file.to_string(),
        },
        logging: LoggingConfig {
            level: "info".to_string(),
            format: default_log_format(),
        },
    }
}

//! GeoIP lookup through an external HTTP geolocation service

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{debug, info, warn};

use crate::config::GeoConfig;

const UNKNOWN: &str = "Unknown";

/// Normalized location for an IP address. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoRecord {
    /// The record returned whenever a lookup is skipped or fails
    pub fn unknown() -> Self {
        Self {
            country: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            city: UNKNOWN.to_string(),
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

/// Fields consumed from the provider's `/{ip}/json/` payload
#[derive(Debug, Deserialize)]
struct ProviderResponse {
    country_name: Option<String>,
    region: Option<String>,
    city: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl From<ProviderResponse> for GeoRecord {
    fn from(body: ProviderResponse) -> Self {
        Self {
            country: body.country_name.unwrap_or_else(|| UNKNOWN.to_string()),
            region: body.region.unwrap_or_else(|| UNKNOWN.to_string()),
            city: body.city.unwrap_or_else(|| UNKNOWN.to_string()),
            latitude: body.latitude.unwrap_or(0.0),
            longitude: body.longitude.unwrap_or(0.0),
        }
    }
}

/// HTTP geolocation client
#[derive(Clone)]
pub struct GeoLookup {
    client: Client,
    service_url: String,
    enabled: bool,
}

impl GeoLookup {
    pub fn new(config: &GeoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        if config.enabled {
            info!("GeoIP lookups via {}", config.service_url);
        } else {
            info!("GeoIP disabled by configuration");
        }

        Ok(Self {
            client,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
        })
    }

    /// Look up an IP address. Never fails: any problem degrades to
    /// [`GeoRecord::unknown`].
    pub async fn lookup(&self, ip: &str) -> GeoRecord {
        if !self.enabled || !is_lookup_candidate(ip) {
            return GeoRecord::unknown();
        }

        match self.fetch(ip).await {
            Ok(record) => record,
            Err(e) => {
                warn!(%ip, "Geolocation error: {}", e);
                GeoRecord::unknown()
            }
        }
    }

    async fn fetch(&self, ip: &str) -> Result<GeoRecord, reqwest::Error> {
        let url = format!("{}/{}/json/", self.service_url, ip);
        debug!(%url, "Querying geolocation service");

        let body: ProviderResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body.into())
    }
}

/// Whether an address is worth sending to the provider
fn is_lookup_candidate(ip: &str) -> bool {
    if ip == "unknown" {
        return false;
    }
    match ip.parse::<IpAddr>() {
        Ok(addr) => !addr.is_loopback(),
        Err(_) => false,
    }
}

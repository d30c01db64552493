//! Place name → coordinate lookup.
//!
//! A miss (no match, empty name, unparsable hit) is `Ok(None)`: filenames
//! routinely contain things that are not places. Transport and HTTP errors
//! are `Err` and fail only the current file.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;
use crate::exif::GpsCoordinate;

/// Trait for geocoding backends.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    /// The display name of this backend.
    fn name(&self) -> &str;
    /// Look up a free-text place name.
    async fn geocode(&self, place: &str) -> Result<Option<GpsCoordinate>>;
}

/// OpenStreetMap Nominatim search API.
///
/// One request per call, no retries. Nominatim's usage policy requires an
/// identifying `User-Agent`, taken from `geocoder.user_agent` in the config.
pub struct NominatimGeocoder {
    endpoint: String,
    client: Client,
}

impl NominatimGeocoder {
    pub fn new(endpoint: String, user_agent: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build geocoding HTTP client")?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.geocoder.endpoint.clone(),
            config.geocoder.user_agent.clone(),
            config.network.timeout(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "Nominatim"
    }

    async fn geocode(&self, place: &str) -> Result<Option<GpsCoordinate>> {
        let place = place.trim();
        if place.is_empty() {
            return Ok(None);
        }

        let resp = self
            .client
            .get(format!("{}/search", self.endpoint))
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .context("Nominatim request failed")?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Nominatim response")?;

        if !status.is_success() {
            anyhow::bail!("Nominatim error ({}): {}", status, text);
        }

        parse_search_response(&text)
    }
}

/// Parse a Nominatim `format=json` search body. First hit wins.
fn parse_search_response(text: &str) -> Result<Option<GpsCoordinate>> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(text).context("Failed to parse Nominatim response JSON")?;

    let Some(first) = places.into_iter().next() else {
        return Ok(None);
    };

    let (Ok(lat), Ok(lon)) = (first.lat.trim().parse::<f64>(), first.lon.trim().parse::<f64>()) else {
        log::warn!("Nominatim returned non-numeric coordinates: {} / {}", first.lat, first.lon);
        return Ok(None);
    };

    match GpsCoordinate::new(lat, lon) {
        Ok(coord) => {
            if let Some(name) = first.display_name {
                log::debug!("Geocoded to {name} ({coord})");
            }
            Ok(Some(coord))
        }
        Err(e) => {
            log::warn!("Nominatim returned an invalid coordinate: {e}");
            Ok(None)
        }
    }
}

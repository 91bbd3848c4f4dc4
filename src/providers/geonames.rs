use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{
    as_number, fetch_text, first_number, parse_json, PopulationSample, QueryOptions,
    SampleProvider,
};
use crate::config::GeonamesConfig;
use crate::error::ProviderError;
use crate::geo::{bounding_box, GeoPoint};

const NAME: &str = "geonames";

const LONGITUDE_ALIASES: &[&[&str]] = &[&["lng"], &["lon"], &["longitude"]];

/// Cities directory queried by bounding box. Needs an account name.
pub struct GeonamesProvider {
    client: Client,
    base_url: String,
    username: Option<String>,
    max_rows: u32,
}

impl GeonamesProvider {
    pub fn new(client: Client, config: &GeonamesConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            username: config
                .username
                .clone()
                .filter(|name| !name.trim().is_empty()),
            max_rows: config.max_rows,
        }
    }
}

#[async_trait]
impl SampleProvider for GeonamesProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch_samples(
        &self,
        center: &GeoPoint,
        max_radius_km: f64,
        _options: &QueryOptions,
    ) -> Result<Vec<PopulationSample>, ProviderError> {
        let Some(username) = self.username.as_deref() else {
            debug!("geonames username not configured; skipping");
            return Ok(Vec::new());
        };

        let bbox = bounding_box(center, max_radius_km).rounded();
        let request = self.client.get(&self.base_url).query(&[
            ("north", bbox.north.to_string()),
            ("south", bbox.south.to_string()),
            ("east", bbox.east.to_string()),
            ("west", bbox.west.to_string()),
            ("maxRows", self.max_rows.to_string()),
            ("lang", "en".to_string()),
            ("username", username.to_string()),
        ]);
        let text = fetch_text(NAME, request).await?;
        let samples = parse_cities(&text)?;
        debug!(count = samples.len(), ?bbox, "geonames cities received");
        Ok(samples)
    }
}

/// Parses a `citiesJSON` body into samples.
///
/// A `status` object in the body is the service reporting an error (quota,
/// bad credential) with HTTP 200.
pub fn parse_cities(text: &str) -> Result<Vec<PopulationSample>, ProviderError> {
    let body = parse_json(NAME, text)?;

    if let Some(status) = body.get("status") {
        let message = status
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        return Err(ProviderError::bad_response(
            NAME,
            format!("service status: {message}"),
        ));
    }

    let Some(cities) = body.get("geonames").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let samples = cities
        .iter()
        .filter_map(|city| {
            let lat = city.get("lat").and_then(as_number)?;
            let lng = first_number(city, LONGITUDE_ALIASES)?;
            let population = city.get("population").and_then(as_number).unwrap_or(0.0);
            let location = GeoPoint::checked(lat, lng)?;
            Some(PopulationSample::new(location, population))
        })
        .filter(PopulationSample::is_valid)
        .collect();
    Ok(samples)
}

//! External population data sources.
//!
//! Two shapes of source exist. A [`SampleProvider`] returns point samples
//! (places with a population) around a center, which the aggregator sums by
//! distance. A [`DensityProvider`] returns a population total per radius
//! directly. Both report failures as [`ProviderError`]; a missing credential is
//! not a failure and yields no samples.

mod geonames;
mod overpass;
mod worldpop;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::geo::GeoPoint;

pub use geonames::{parse_cities, GeonamesProvider};
pub use overpass::{build_query, clean_population, parse_elements, OverpassProvider};
pub use worldpop::{
    disk_grid, layer_url, parse_sample_values, RasterDensityEstimator, RasterSampler,
    WorldpopSampler,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationSample {
    pub location: GeoPoint,
    pub population: f64,
    /// Great-circle distance to the query center, set once matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

impl PopulationSample {
    pub fn new(location: GeoPoint, population: f64) -> Self {
        Self {
            location,
            population,
            distance_km: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.population.is_finite() && self.population > 0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Reference year for sources that keep yearly layers.
    pub year: Option<u16>,
}

#[async_trait]
pub trait SampleProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_samples(
        &self,
        center: &GeoPoint,
        max_radius_km: f64,
        options: &QueryOptions,
    ) -> Result<Vec<PopulationSample>, ProviderError>;
}

#[async_trait]
pub trait DensityProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// One entry per radius, `None` where the source had no usable value.
    async fn population_by_radius(
        &self,
        center: &GeoPoint,
        radii_km: &[f64],
        options: &QueryOptions,
    ) -> Result<Vec<Option<f64>>, ProviderError>;
}

pub fn http_client(timeout: Duration, user_agent: &str) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Sends a request and returns the body of a 2xx response.
pub(crate) async fn fetch_text(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<String, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|err| transport_error(provider, err))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|err| transport_error(provider, err))?;
    if !status.is_success() {
        return Err(ProviderError::unavailable(
            provider,
            format!("HTTP {}: {}", status.as_u16(), snippet(&text)),
        ));
    }
    Ok(text)
}

fn transport_error(provider: &'static str, err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::unavailable(provider, "request timed out")
    } else {
        ProviderError::unavailable(provider, err.to_string())
    }
}

pub(crate) fn parse_json(provider: &'static str, text: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(text).map_err(|err| {
        ProviderError::bad_response(provider, format!("{err}: {}", snippet(text)))
    })
}

/// Leading part of a response body for log lines.
pub(crate) fn snippet(text: &str) -> String {
    text.chars().take(120).collect()
}

/// Reads a JSON number, or a string holding one.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// First alias path that resolves to a number. Each alias is a key path into
/// nested objects, e.g. `&["attributes", "Value"]`.
pub(crate) fn first_number(record: &Value, aliases: &[&[&str]]) -> Option<f64> {
    aliases.iter().find_map(|path| {
        let value = path
            .iter()
            .try_fold(record, |node, key| node.get(*key))?;
        as_number(value)
    })
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{as_number, fetch_text, parse_json, PopulationSample, QueryOptions, SampleProvider};
use crate::config::OverpassConfig;
use crate::error::ProviderError;
use crate::geo::GeoPoint;

const NAME: &str = "overpass";

const PLACE_KINDS: [&str; 3] = ["city", "town", "village"];

/// Community map-data query service; place nodes carrying a population tag.
pub struct OverpassProvider {
    client: Client,
    url: String,
    query_timeout_secs: u64,
    max_results: u32,
}

impl OverpassProvider {
    pub fn new(client: Client, config: &OverpassConfig) -> Self {
        Self {
            client,
            url: config.url.clone(),
            query_timeout_secs: config.query_timeout_secs,
            max_results: config.max_results,
        }
    }
}

#[async_trait]
impl SampleProvider for OverpassProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn fetch_samples(
        &self,
        center: &GeoPoint,
        max_radius_km: f64,
        _options: &QueryOptions,
    ) -> Result<Vec<PopulationSample>, ProviderError> {
        let query = build_query(center, max_radius_km, self.query_timeout_secs, self.max_results);
        let request = self.client.post(&self.url).form(&[("data", query)]);
        let text = fetch_text(NAME, request).await?;
        let samples = parse_elements(&text)?;
        debug!(count = samples.len(), "overpass places received");
        Ok(samples)
    }
}

/// Overpass QL for populated place nodes within `radius_km` of `center`.
pub fn build_query(center: &GeoPoint, radius_km: f64, timeout_secs: u64, max_results: u32) -> String {
    let radius_m = (radius_km * 1000.0).round() as i64;
    let mut query = format!("[out:json][timeout:{timeout_secs}];\n(\n");
    for kind in PLACE_KINDS {
        query.push_str(&format!(
            "  node(around:{radius_m},{},{})[place={kind}][population];\n",
            center.lat, center.lng
        ));
    }
    query.push_str(&format!(");\nout tags center {max_results};"));
    query
}

/// Population tag value with thousands separators and whitespace removed.
/// Non-numeric or non-positive values give `None`.
pub fn clean_population(raw: &Value) -> Option<f64> {
    let cleaned = match raw {
        Value::String(s) => s
            .chars()
            .filter(|c| *c != ',' && !c.is_whitespace())
            .collect::<String>(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let population = cleaned.parse::<f64>().ok()?;
    (population.is_finite() && population > 0.0).then_some(population)
}

pub fn parse_elements(text: &str) -> Result<Vec<PopulationSample>, ProviderError> {
    let body = parse_json(NAME, text)?;
    let Some(elements) = body.get("elements").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let samples = elements
        .iter()
        .filter(|element| element.get("type").and_then(Value::as_str) == Some("node"))
        .filter_map(|node| {
            let population = clean_population(node.get("tags")?.get("population")?)?;
            let lat = node
                .get("lat")
                .or_else(|| node.get("center")?.get("lat"))
                .and_then(as_number)?;
            let lng = node
                .get("lon")
                .or_else(|| node.get("center")?.get("lon"))
                .and_then(as_number)?;
            let location = GeoPoint::checked(lat, lng)?;
            Some(PopulationSample::new(location, population))
        })
        .collect();
    Ok(samples)
}

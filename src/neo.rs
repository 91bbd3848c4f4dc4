//! Near-Earth-object lookups, flattened into impact-model inputs.

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::NeoConfig;
use crate::providers::{as_number, http_client, snippet};

#[derive(Debug, Error)]
pub enum NeoError {
    #[error("NEO API key is not configured")]
    MissingApiKey,
    #[error("NEO request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("NEO service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("NEO response could not be parsed: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeoSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub diameter_m: Option<u64>,
    pub speed_kms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hazardous: Option<bool>,
}

pub struct NeoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NeoClient {
    pub fn new(client: Client, config: &NeoConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn from_config(config: &NeoConfig, timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        Ok(Self::new(http_client(timeout, user_agent)?, config))
    }

    /// Objects approaching between `start` and `end` (inclusive). `start`
    /// defaults to today (UTC) and `end` to `start`.
    pub async fn feed(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<NeoSummary>, NeoError> {
        let start = start.unwrap_or_else(|| Utc::now().date_naive());
        let end = end.unwrap_or(start);
        let url = format!("{}/feed", self.base_url);
        let body = self
            .get_json(
                &url,
                &[
                    ("start_date", start.format("%Y-%m-%d").to_string()),
                    ("end_date", end.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;
        Ok(normalize_feed(&body))
    }

    pub async fn lookup(&self, asteroid_id: &str) -> Result<NeoSummary, NeoError> {
        let url = format!("{}/neo/{}", self.base_url, asteroid_id);
        let body = self.get_json(&url, &[]).await?;
        Ok(normalize_lookup(&body))
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, NeoError> {
        let api_key = self.api_key.as_deref().ok_or(NeoError::MissingApiKey)?;
        let response = self
            .client
            .get(url)
            .query(params)
            .query(&[("api_key", api_key)])
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(NeoError::Status {
                status: status.as_u16(),
                body: snippet(&text),
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Mean of the estimated diameter range in meters, rounded.
fn mean_diameter_m(object: &Value) -> Option<u64> {
    let meters = object.get("estimated_diameter")?.get("meters")?;
    let min = meters.get("estimated_diameter_min").and_then(as_number)?;
    let max = meters.get("estimated_diameter_max").and_then(as_number)?;
    if min <= 0.0 || max <= 0.0 {
        return None;
    }
    let mean = ((min + max) / 2.0).round();
    (mean > 0.0).then_some(mean as u64)
}

/// Relative speed at the first listed close approach, rounded to km/s.
fn approach_speed_kms(object: &Value) -> Option<u64> {
    let speed = object
        .get("close_approach_data")?
        .as_array()?
        .first()?
        .get("relative_velocity")?
        .get("kilometers_per_second")
        .and_then(as_number)?;
    let speed = speed.round();
    (speed > 0.0).then_some(speed as u64)
}

fn text_field(object: &Value, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Flattens a feed body; entries without both diameter and speed are dropped.
pub fn normalize_feed(body: &Value) -> Vec<NeoSummary> {
    let Some(by_date) = body.get("near_earth_objects").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut items = Vec::new();
    for (date, objects) in by_date {
        for object in objects.as_array().into_iter().flatten() {
            let summary = NeoSummary {
                id: text_field(object, "id"),
                name: text_field(object, "name"),
                date: Some(date.clone()),
                diameter_m: mean_diameter_m(object),
                speed_kms: approach_speed_kms(object),
                hazardous: Some(
                    object
                        .get("is_potentially_hazardous_asteroid")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                ),
            };
            if summary.diameter_m.is_some() && summary.speed_kms.is_some() {
                items.push(summary);
            }
        }
    }
    items
}

pub fn normalize_lookup(object: &Value) -> NeoSummary {
    NeoSummary {
        id: text_field(object, "id"),
        name: text_field(object, "name"),
        date: None,
        diameter_m: mean_diameter_m(object),
        speed_kms: approach_speed_kms(object),
        hazardous: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn neo(id: &str, min: f64, max: f64, speed: &str) -> Value {
        json!({
            "id": id,
            "name": format!("({id})"),
            "is_potentially_hazardous_asteroid": id == "2",
            "estimated_diameter": {"meters": {"estimated_diameter_min": min, "estimated_diameter_max": max}},
            "close_approach_data": [{"relative_velocity": {"kilometers_per_second": speed}}]
        })
    }

    #[test]
    fn feed_is_flattened_and_filtered() {
        let body = json!({
            "near_earth_objects": {
                "2024-05-01": [neo("1", 100.0, 141.0, "18.6"), neo("2", 0.0, 10.0, "5.0")],
                "2024-05-02": [neo("3", 20.0, 30.0, "7.4"), {"id": "4", "name": "bare"}]
            }
        });
        let items = normalize_feed(&body);
        assert_eq!(items.len(), 2);
        let first = items.iter().find(|i| i.id == "1").unwrap();
        assert_eq!(first.diameter_m, Some(121));
        assert_eq!(first.speed_kms, Some(19));
        assert_eq!(first.date.as_deref(), Some("2024-05-01"));
        assert_eq!(first.hazardous, Some(false));
        assert!(items.iter().any(|i| i.id == "3" && i.speed_kms == Some(7)));
    }

    #[test]
    fn lookup_keeps_missing_fields() {
        let summary = normalize_lookup(&json!({"id": "3542519", "name": "(2010 PK9)"}));
        assert_eq!(summary.id, "3542519");
        assert_eq!(summary.diameter_m, None);
        assert_eq!(summary.speed_kms, None);

        let summary = normalize_lookup(&neo("9", 300.0, 500.0, "12.49"));
        assert_eq!(summary.diameter_m, Some(400));
        assert_eq!(summary.speed_kms, Some(12));
    }

    #[test]
    fn values_rounding_to_zero_are_missing() {
        let body = json!({
            "near_earth_objects": {
                "2024-05-03": [neo("5", 50.0, 60.0, "0.3"), neo("6", 0.1, 0.2, "9.0")]
            }
        });
        assert!(normalize_feed(&body).is_empty());

        let summary = normalize_lookup(&neo("5", 50.0, 60.0, "0.3"));
        assert_eq!(summary.diameter_m, Some(55));
        assert_eq!(summary.speed_kms, None);
    }

    #[test]
    fn empty_feed_body() {
        assert!(normalize_feed(&json!({})).is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_reported_without_request() {
        let client = NeoClient::new(Client::new(), &NeoConfig::default());
        assert!(matches!(
            client.lookup("3542519").await,
            Err(NeoError::MissingApiKey)
        ));
    }
}

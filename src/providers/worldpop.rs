use std::f64::consts::PI;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{fetch_text, first_number, parse_json, DensityProvider, QueryOptions};
use crate::config::WorldpopConfig;
use crate::error::ProviderError;
use crate::geo::{km_to_degrees_latitude, km_to_degrees_longitude, wrap_longitude, GeoPoint};

const NAME: &str = "worldpop";

/// Years with a published 1 km layer.
const LAYER_YEARS: std::ops::RangeInclusive<u16> = 2015..=2020;

/// Field names seen for the sampled value across sample records.
const VALUE_ALIASES: &[&[&str]] = &[
    &["value"],
    &["Value"],
    &["attributes", "Value"],
    &["attributes", "value"],
    &["attributes", "PixelValue"],
    &["attributes", "Pixelvalue"],
    &["attributes", "PixelVal"],
    &["attributes", "PIXEL_VALUE"],
];

/// Point sampling against a population-density raster (persons/km²).
#[async_trait]
pub trait RasterSampler: Send + Sync {
    /// Largest number of points accepted by one call.
    fn max_points(&self) -> usize;

    /// Density values for the points that had one; order is not significant.
    async fn sample(&self, points: &[GeoPoint], year: u16) -> Result<Vec<f64>, ProviderError>;
}

/// `getSamples` on the yearly WorldPop image services.
pub struct WorldpopSampler {
    client: Client,
    base_url: String,
    default_year: u16,
    batch_size: usize,
}

impl WorldpopSampler {
    pub fn new(client: Client, config: &WorldpopConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            default_year: config.default_year,
            batch_size: config.batch_size,
        }
    }
}

/// Layer endpoint for `year`; years without a layer use `default_year`.
pub fn layer_url(base_url: &str, year: u16, default_year: u16) -> String {
    let year = if LAYER_YEARS.contains(&year) {
        year
    } else {
        default_year
    };
    format!(
        "{}/WorldPop_Population_{year}_1km/ImageServer/getSamples",
        base_url.trim_end_matches('/')
    )
}

#[async_trait]
impl RasterSampler for WorldpopSampler {
    fn max_points(&self) -> usize {
        self.batch_size
    }

    async fn sample(&self, points: &[GeoPoint], year: u16) -> Result<Vec<f64>, ProviderError> {
        let geometry = json!({
            "points": points.iter().map(|p| [p.lng, p.lat]).collect::<Vec<_>>(),
            "spatialReference": { "wkid": 4326 },
        });
        let request = self
            .client
            .get(layer_url(&self.base_url, year, self.default_year))
            .query(&[
                ("f", "json".to_string()),
                ("outFields", "*".to_string()),
                ("geometry", geometry.to_string()),
                ("geometryType", "esriGeometryMultipoint".to_string()),
                ("returnGeometry", "false".to_string()),
                ("interpolateValues", "true".to_string()),
            ]);
        let text = fetch_text(NAME, request).await?;
        parse_sample_values(&text)
    }
}

pub fn parse_sample_values(text: &str) -> Result<Vec<f64>, ProviderError> {
    let body = parse_json(NAME, text)?;
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        return Err(ProviderError::bad_response(
            NAME,
            format!("service error: {message}"),
        ));
    }
    let values = body
        .get("samples")
        .and_then(Value::as_array)
        .map(|samples| {
            samples
                .iter()
                .filter_map(|sample| first_number(sample, VALUE_ALIASES))
                .collect()
        })
        .unwrap_or_default();
    Ok(values)
}

/// Grid of `grid × grid` points over the square around `center`, keeping the
/// ones inside the disk of `radius_km`. `grid` must be odd and at least 3.
pub fn disk_grid(center: &GeoPoint, radius_km: f64, grid: usize) -> Vec<GeoPoint> {
    let half = (grid.max(3) / 2) as i64;
    let mut points = Vec::new();
    for iy in -half..=half {
        for ix in -half..=half {
            if ix * ix + iy * iy > half * half {
                continue;
            }
            let dx_km = radius_km * ix as f64 / half as f64;
            let dy_km = radius_km * iy as f64 / half as f64;
            points.push(GeoPoint {
                lat: (center.lat + km_to_degrees_latitude(dy_km)).clamp(-90.0, 90.0),
                lng: wrap_longitude(center.lng + km_to_degrees_longitude(dx_km, center.lat)),
            });
        }
    }
    points
}

/// Estimates the population of each disk as mean sampled density × area.
///
/// A first pass uses the coarse grid; a disk with no usable value is sampled
/// once more on the dense grid before it is given up.
pub struct RasterDensityEstimator<S> {
    sampler: S,
    grid: usize,
    retry_grid: usize,
    default_year: u16,
}

impl<S: RasterSampler> RasterDensityEstimator<S> {
    pub fn new(sampler: S, grid: usize, retry_grid: usize, default_year: u16) -> Self {
        Self {
            sampler,
            grid,
            retry_grid,
            default_year,
        }
    }

    pub fn from_config(sampler: S, config: &WorldpopConfig) -> Self {
        Self::new(sampler, config.grid, config.retry_grid, config.default_year)
    }

    /// Mean density over the points, batched to the sampler's point limit.
    /// Failed batches are skipped; the last failure is returned only when no
    /// batch produced a value.
    async fn mean_density(
        &self,
        points: &[GeoPoint],
        year: u16,
    ) -> Result<Option<f64>, ProviderError> {
        let batch_size = self.sampler.max_points().max(1);
        let mut values = Vec::new();
        let mut last_error = None;
        for batch in points.chunks(batch_size) {
            match self.sampler.sample(batch, year).await {
                Ok(batch_values) => values.extend(batch_values),
                Err(err) => {
                    debug!(error = %err, points = batch.len(), "raster batch failed");
                    last_error = Some(err);
                }
            }
        }
        if values.is_empty() {
            return match last_error {
                Some(err) => Err(err),
                None => Ok(None),
            };
        }
        Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
    }

    async fn disk_population(
        &self,
        center: &GeoPoint,
        radius_km: f64,
        year: u16,
    ) -> Result<Option<f64>, ProviderError> {
        let coarse = disk_grid(center, radius_km, self.grid);
        let mean = match self.mean_density(&coarse, year).await {
            Ok(Some(mean)) => Some(mean),
            coarse_result => {
                let dense = disk_grid(center, radius_km, self.retry_grid);
                match (self.mean_density(&dense, year).await, coarse_result) {
                    (Ok(Some(mean)), _) => Some(mean),
                    (Ok(None), Ok(_)) => None,
                    (Ok(None), Err(err)) | (Err(err), _) => return Err(err),
                }
            }
        };
        Ok(mean.map(|density| density * PI * radius_km * radius_km))
    }
}

#[async_trait]
impl<S: RasterSampler> DensityProvider for RasterDensityEstimator<S> {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn population_by_radius(
        &self,
        center: &GeoPoint,
        radii_km: &[f64],
        options: &QueryOptions,
    ) -> Result<Vec<Option<f64>>, ProviderError> {
        let year = options.year.unwrap_or(self.default_year);
        let mut totals = Vec::with_capacity(radii_km.len());
        let mut failures = Vec::new();
        for &radius in radii_km {
            match self.disk_population(center, radius, year).await {
                Ok(total) => totals.push(total),
                Err(err) => {
                    totals.push(None);
                    failures.push(err);
                }
            }
        }
        if totals.iter().all(Option::is_none) {
            if let Some(err) = failures.pop() {
                return Err(err);
            }
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers every point with a fixed density and records batch sizes.
    struct FixedSampler {
        density: Option<f64>,
        limit: usize,
        calls: Mutex<Vec<usize>>,
    }

    impl FixedSampler {
        fn new(density: Option<f64>, limit: usize) -> Self {
            Self {
                density,
                limit,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RasterSampler for FixedSampler {
        fn max_points(&self) -> usize {
            self.limit
        }

        async fn sample(&self, points: &[GeoPoint], _year: u16) -> Result<Vec<f64>, ProviderError> {
            assert!(points.len() <= self.limit);
            self.calls.lock().unwrap().push(points.len());
            Ok(self.density.map(|d| vec![d; points.len()]).unwrap_or_default())
        }
    }

    struct FailingSampler;

    #[async_trait]
    impl RasterSampler for FailingSampler {
        fn max_points(&self) -> usize {
            180
        }

        async fn sample(&self, _points: &[GeoPoint], _year: u16) -> Result<Vec<f64>, ProviderError> {
            Err(ProviderError::unavailable("worldpop", "HTTP 503: busy"))
        }
    }

    #[test]
    fn grid_keeps_points_inside_the_disk() {
        let center = GeoPoint::new(10.0, 20.0).unwrap();
        assert_eq!(disk_grid(&center, 5.0, 21).len(), 317);
        assert_eq!(disk_grid(&center, 5.0, 25).len(), 441);
        for p in disk_grid(&center, 5.0, 21) {
            assert!(center.distance_km(&p) <= 5.0 + 0.05, "{p:?}");
        }
    }

    #[test]
    fn grid_near_pole_stays_in_range() {
        let center = GeoPoint::new(89.99, 179.9).unwrap();
        for p in disk_grid(&center, 50.0, 21) {
            assert!((-90.0..=90.0).contains(&p.lat));
            assert!((-180.0..=180.0).contains(&p.lng));
        }
    }

    #[test]
    fn layer_selection_falls_back_to_default_year() {
        assert_eq!(
            layer_url("https://x/services/", 2017, 2020),
            "https://x/services/WorldPop_Population_2017_1km/ImageServer/getSamples"
        );
        assert!(layer_url("https://x/services", 1999, 2020).contains("_2020_1km"));
    }

    #[test]
    fn sample_values_use_field_aliases() {
        let body = r#"{"samples":[
            {"value":"12.5"},
            {"attributes":{"Value":7}},
            {"attributes":{"PIXEL_VALUE":3.5}},
            {"attributes":{"Other":1}},
            {"value":"NoData"}
        ]}"#;
        assert_eq!(parse_sample_values(body).unwrap(), vec![12.5, 7.0, 3.5]);
        assert!(parse_sample_values("{}").unwrap().is_empty());
        assert!(matches!(
            parse_sample_values(r#"{"error":{"code":400,"message":"Invalid geometry"}}"#),
            Err(ProviderError::BadResponse { .. })
        ));
    }

    #[tokio::test]
    async fn batches_respect_point_limit() {
        let estimator = RasterDensityEstimator::new(FixedSampler::new(Some(100.0), 180), 21, 25, 2020);
        let center = GeoPoint::new(0.0, 0.0).unwrap();
        let totals = estimator
            .population_by_radius(&center, &[10.0], &QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(*estimator.sampler.calls.lock().unwrap(), vec![180, 137]);
        let expected = 100.0 * PI * 100.0;
        assert!((totals[0].unwrap() - expected).abs() < 1e-6);
    }

    #[tokio::test]
    async fn empty_coarse_grid_retries_dense_grid_once() {
        let estimator = RasterDensityEstimator::new(FixedSampler::new(None, 180), 21, 25, 2020);
        let center = GeoPoint::new(0.0, 0.0).unwrap();
        let totals = estimator
            .population_by_radius(&center, &[3.0, 6.0], &QueryOptions { year: Some(2018) })
            .await
            .unwrap();
        assert_eq!(totals, vec![None, None]);
        // per radius: 317 points in two batches, then 441 points in three
        assert_eq!(
            *estimator.sampler.calls.lock().unwrap(),
            vec![180, 137, 180, 180, 81, 180, 137, 180, 180, 81]
        );
    }

    #[tokio::test]
    async fn all_batches_failing_is_reported() {
        let estimator = RasterDensityEstimator::new(FailingSampler, 21, 25, 2020);
        let center = GeoPoint::new(0.0, 0.0).unwrap();
        let result = estimator
            .population_by_radius(&center, &[3.0], &QueryOptions::default())
            .await;
        assert!(matches!(result, Err(ProviderError::Unavailable { .. })));
    }
}

//! Population exposure around an impact point.
//!
//! The aggregator walks a fixed chain of population sources and stops at the
//! first one that returns usable data. Provider failures are logged and treated
//! as "no data"; when every source comes back empty the report is all zeros.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ImpactError, ProviderError};
use crate::geo::GeoPoint;
use crate::providers::{DensityProvider, PopulationSample, QueryOptions, SampleProvider};

pub const DEFAULT_FATALITY_FRACTION: f64 = 0.35;

/// Deduplication precision for sample coordinates, in degrees.
const SAMPLE_COORD_EPSILON: f64 = 1e-6;

#[derive(Clone)]
pub enum PopulationSource {
    Samples(Arc<dyn SampleProvider>),
    Density(Arc<dyn DensityProvider>),
}

impl PopulationSource {
    pub fn name(&self) -> &'static str {
        match self {
            PopulationSource::Samples(provider) => provider.name(),
            PopulationSource::Density(provider) => provider.name(),
        }
    }
}

#[derive(Clone)]
pub struct ChainLink {
    pub source: PopulationSource,
    /// Wait applied before this source when an earlier one was tried first.
    pub delay_after_previous: Duration,
}

impl ChainLink {
    pub fn new(source: PopulationSource) -> Self {
        Self {
            source,
            delay_after_previous: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_after_previous = delay;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusPopulation {
    pub r: f64,
    pub pop: u64,
}

/// Per-radius population, whichever source shape produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationSummary {
    pub by_radius: Vec<RadiusPopulation>,
    pub source: Option<&'static str>,
}

impl PopulationSummary {
    pub fn zeros(radii_km: &[f64]) -> Self {
        Self {
            by_radius: radii_km
                .iter()
                .map(|&r| RadiusPopulation { r, pop: 0 })
                .collect(),
            source: None,
        }
    }

    /// Sums sample populations within each radius. Distances are computed once
    /// per sample and stored on it.
    pub fn from_samples(
        center: &GeoPoint,
        radii_km: &[f64],
        samples: &mut [PopulationSample],
        source: &'static str,
    ) -> Self {
        for sample in samples.iter_mut() {
            sample.distance_km = Some(center.distance_km(&sample.location));
        }
        let by_radius = radii_km
            .iter()
            .map(|&r| {
                let total: f64 = samples
                    .iter()
                    .filter(|s| s.distance_km.is_some_and(|d| d <= r))
                    .map(|s| s.population)
                    .sum();
                RadiusPopulation {
                    r,
                    pop: round_population(total),
                }
            })
            .collect();
        Self {
            by_radius,
            source: Some(source),
        }
    }

    pub fn from_totals(radii_km: &[f64], totals: &[Option<f64>], source: &'static str) -> Self {
        let by_radius = radii_km
            .iter()
            .enumerate()
            .map(|(i, &r)| RadiusPopulation {
                r,
                pop: totals
                    .get(i)
                    .copied()
                    .flatten()
                    .map(round_population)
                    .unwrap_or(0),
            })
            .collect();
        Self {
            by_radius,
            source: Some(source),
        }
    }

    pub fn population_at(&self, radius_km: f64) -> Option<u64> {
        self.by_radius
            .iter()
            .find(|entry| entry.r == radius_km)
            .map(|entry| entry.pop)
    }
}

fn round_population(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureReport {
    pub by_radius: Vec<RadiusPopulation>,
    pub deaths_estimate: u64,
    /// Provider that served the data; `None` when none had any.
    pub source: Option<String>,
}

impl ExposureReport {
    /// Population of the numerically smallest radius.
    pub fn severe_population(&self) -> u64 {
        self.by_radius
            .iter()
            .min_by(|a, b| a.r.total_cmp(&b.r))
            .map(|entry| entry.pop)
            .unwrap_or(0)
    }
}

/// Validated radius list: positive, finite, duplicates removed, caller order kept.
pub fn normalize_radii(radii_km: &[f64]) -> Result<Vec<f64>, ImpactError> {
    if radii_km.is_empty() {
        return Err(ImpactError::InvalidQuery(
            "at least one radius is required".into(),
        ));
    }
    let mut radii: Vec<f64> = Vec::with_capacity(radii_km.len());
    for &r in radii_km {
        if !r.is_finite() || r <= 0.0 {
            return Err(ImpactError::InvalidQuery(format!(
                "radius must be a positive number of km, got {r}"
            )));
        }
        if !radii.contains(&r) {
            radii.push(r);
        }
    }
    Ok(radii)
}

/// Drops invalid samples and collapses samples sharing a location.
fn dedup_samples(samples: Vec<PopulationSample>) -> Vec<PopulationSample> {
    let mut kept: Vec<PopulationSample> = Vec::with_capacity(samples.len());
    for sample in samples.into_iter().filter(PopulationSample::is_valid) {
        let duplicate = kept.iter().any(|k| {
            (k.location.lat - sample.location.lat).abs() < SAMPLE_COORD_EPSILON
                && (k.location.lng - sample.location.lng).abs() < SAMPLE_COORD_EPSILON
        });
        if !duplicate {
            kept.push(sample);
        }
    }
    kept
}

pub struct ExposureAggregator {
    chain: Vec<ChainLink>,
    fatality_fraction: f64,
    call_timeout: Option<Duration>,
}

impl ExposureAggregator {
    pub fn new(fatality_fraction: f64) -> Self {
        Self {
            chain: Vec::new(),
            fatality_fraction,
            call_timeout: None,
        }
    }

    pub fn with_link(mut self, link: ChainLink) -> Self {
        self.chain.push(link);
        self
    }

    pub fn with_samples(self, provider: impl SampleProvider + 'static) -> Self {
        self.with_link(ChainLink::new(PopulationSource::Samples(Arc::new(provider))))
    }

    pub fn with_density(self, provider: impl DensityProvider + 'static) -> Self {
        self.with_link(ChainLink::new(PopulationSource::Density(Arc::new(provider))))
    }

    /// Upper bound on one source call, on top of per-request HTTP timeouts.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn chain(&self) -> &[ChainLink] {
        &self.chain
    }

    pub async fn estimate_exposure(
        &self,
        center: GeoPoint,
        radii_km: &[f64],
        year: Option<u16>,
    ) -> Result<ExposureReport, ImpactError> {
        let center = GeoPoint::new(center.lat, center.lng)?;
        let radii = normalize_radii(radii_km)?;
        let options = QueryOptions { year };

        let mut summary = None;
        for (index, link) in self.chain.iter().enumerate() {
            if index > 0 && !link.delay_after_previous.is_zero() {
                debug!(
                    provider = link.source.name(),
                    delay_ms = link.delay_after_previous.as_millis() as u64,
                    "waiting before next provider"
                );
                tokio::time::sleep(link.delay_after_previous).await;
            }
            match self.query_source(&link.source, &center, &radii, &options).await {
                Ok(Some(found)) => {
                    summary = Some(found);
                    break;
                }
                Ok(None) => {
                    info!(provider = link.source.name(), "provider returned no population data");
                }
                Err(err) => {
                    warn!(provider = err.provider(), error = %err, "provider failed; trying next");
                }
            }
        }

        let summary = summary.unwrap_or_else(|| PopulationSummary::zeros(&radii));
        Ok(self.report(summary, &radii))
    }

    async fn query_source(
        &self,
        source: &PopulationSource,
        center: &GeoPoint,
        radii: &[f64],
        options: &QueryOptions,
    ) -> Result<Option<PopulationSummary>, ProviderError> {
        let call = self.fetch_summary(source, center, radii, options);
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ProviderError::unavailable(
                    source.name(),
                    format!("no answer within {}s", limit.as_secs_f64()),
                )
            })?,
            None => call.await,
        }
    }

    async fn fetch_summary(
        &self,
        source: &PopulationSource,
        center: &GeoPoint,
        radii: &[f64],
        options: &QueryOptions,
    ) -> Result<Option<PopulationSummary>, ProviderError> {
        match source {
            PopulationSource::Samples(provider) => {
                let max_radius = radii.iter().copied().fold(0.0, f64::max);
                let samples = provider.fetch_samples(center, max_radius, options).await?;
                let mut samples = dedup_samples(samples);
                if samples.is_empty() {
                    return Ok(None);
                }
                debug!(provider = provider.name(), count = samples.len(), "summing samples");
                Ok(Some(PopulationSummary::from_samples(
                    center,
                    radii,
                    &mut samples,
                    provider.name(),
                )))
            }
            PopulationSource::Density(provider) => {
                let totals = provider.population_by_radius(center, radii, options).await?;
                if totals.iter().all(Option::is_none) {
                    return Ok(None);
                }
                Ok(Some(PopulationSummary::from_totals(
                    radii,
                    &totals,
                    provider.name(),
                )))
            }
        }
    }

    /// Deaths come from the numerically smallest radius, whatever its position
    /// in the request.
    fn report(&self, summary: PopulationSummary, radii: &[f64]) -> ExposureReport {
        let severe_radius = radii.iter().copied().fold(f64::INFINITY, f64::min);
        let severe_pop = summary.population_at(severe_radius).unwrap_or(0);
        let deaths_estimate = (severe_pop as f64 * self.fatality_fraction).round() as u64;
        ExposureReport {
            by_radius: summary.by_radius,
            deaths_estimate,
            source: summary.source.map(str::to_string),
        }
    }
}

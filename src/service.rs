//! Entry point for the HTTP layer and the CLI: damage radii plus exposure.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::{ProviderKind, ServiceConfig};
use crate::error::ImpactError;
use crate::exposure::{ChainLink, ExposureAggregator, ExposureReport, PopulationSource};
use crate::geo::GeoPoint;
use crate::impact::{compute_damage_radii, DamageRadii, ImpactParameters};
use crate::providers::{
    http_client, GeonamesProvider, OverpassProvider, RasterDensityEstimator, WorldpopSampler,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub radii: DamageRadii,
    pub exposure: ExposureReport,
}

pub struct ImpactService {
    aggregator: ExposureAggregator,
}

impl ImpactService {
    pub fn new(aggregator: ExposureAggregator) -> Self {
        Self { aggregator }
    }

    /// Builds the provider chain named in the configuration. Credentials come
    /// from the configuration only.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let providers = &config.providers;
        let client = http_client(
            Duration::from_secs(providers.timeout_secs),
            &providers.user_agent,
        )
        .context("Failed to build HTTP client for population providers")?;

        let mut aggregator = ExposureAggregator::new(config.exposure.fatality_fraction)
            .with_call_timeout(Duration::from_secs(providers.call_budget_secs));
        for kind in &providers.chain {
            let link = match kind {
                ProviderKind::Geonames => ChainLink::new(PopulationSource::Samples(Arc::new(
                    GeonamesProvider::new(client.clone(), &providers.geonames),
                ))),
                ProviderKind::Overpass => ChainLink::new(PopulationSource::Samples(Arc::new(
                    OverpassProvider::new(client.clone(), &providers.overpass),
                )))
                .with_delay(Duration::from_millis(
                    providers.overpass.politeness_delay_ms,
                )),
                ProviderKind::Worldpop => {
                    let sampler = WorldpopSampler::new(client.clone(), &providers.worldpop);
                    ChainLink::new(PopulationSource::Density(Arc::new(
                        RasterDensityEstimator::from_config(sampler, &providers.worldpop),
                    )))
                }
            };
            aggregator = aggregator.with_link(link);
        }
        Ok(Self::new(aggregator))
    }

    pub fn compute_damage_radii(&self, params: &ImpactParameters) -> Result<DamageRadii, ImpactError> {
        compute_damage_radii(params)
    }

    pub async fn estimate_exposure(
        &self,
        lat: f64,
        lng: f64,
        radii_km: &[f64],
        year: Option<u16>,
    ) -> Result<ExposureReport, ImpactError> {
        let center = GeoPoint::new(lat, lng)?;
        self.aggregator.estimate_exposure(center, radii_km, year).await
    }

    /// Radii from the impact model, queried as whole kilometers (at least 1 km).
    pub async fn assess(
        &self,
        params: &ImpactParameters,
        lat: f64,
        lng: f64,
        year: Option<u16>,
    ) -> Result<ImpactAssessment, ImpactError> {
        let center = GeoPoint::new(lat, lng)?;
        let radii = compute_damage_radii(params)?;
        let exposure = self
            .aggregator
            .estimate_exposure(center, &radii.query_radii_km(), year)
            .await?;
        Ok(ImpactAssessment { radii, exposure })
    }
}

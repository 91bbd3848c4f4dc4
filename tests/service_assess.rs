use std::path::PathBuf;

use async_trait::async_trait;
use impactscope::{
    config::{ProviderKind, ServiceConfig},
    exposure::{ExposureAggregator, RadiusPopulation},
    providers::{PopulationSample, QueryOptions, SampleProvider},
    GeoPoint, ImpactError, ImpactMedium, ImpactParameters, ImpactService, ProviderError,
};

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/impactscope.yaml")
}

/// One town at the impact point and one ~100 km east of it.
struct TwoTowns;

#[async_trait]
impl SampleProvider for TwoTowns {
    fn name(&self) -> &'static str {
        "two-towns"
    }

    async fn fetch_samples(
        &self,
        center: &GeoPoint,
        _max_radius_km: f64,
        _options: &QueryOptions,
    ) -> Result<Vec<PopulationSample>, ProviderError> {
        let east = GeoPoint::new(center.lat, center.lng + 0.9).unwrap();
        Ok(vec![
            PopulationSample::new(*center, 20_000.0),
            PopulationSample::new(east, 50_000.0),
        ])
    }
}

#[test]
fn fixture_config_loads() {
    let config = ServiceConfig::load(fixture_path()).expect("config parses");
    assert_eq!(
        config.providers.chain,
        vec![ProviderKind::Geonames, ProviderKind::Overpass]
    );
    assert_eq!(config.providers.overpass.politeness_delay_ms, 1200);
    assert_eq!(config.exposure.fatality_fraction, 0.35);
    assert!(config.providers.geonames.username.is_none());
    assert!(ImpactService::from_config(&config).is_ok());
}

#[tokio::test]
async fn assess_combines_radii_and_exposure() {
    let service = ImpactService::new(ExposureAggregator::new(0.35).with_samples(TwoTowns));
    let params = ImpactParameters::new(200.0, 19.0, 45.0, ImpactMedium::Ground);

    let assessment = service.assess(&params, 0.0, 10.0, None).await.unwrap();

    assert_eq!(assessment.radii.severe_km, 34.6);
    assert_eq!(assessment.radii.major_km, 62.3);
    assert_eq!(assessment.radii.light_km, 110.7);
    assert_eq!(assessment.radii.energy_mt, 542.12);
    assert_eq!(
        assessment.exposure.by_radius,
        vec![
            RadiusPopulation { r: 35.0, pop: 20_000 },
            RadiusPopulation { r: 62.0, pop: 20_000 },
            RadiusPopulation { r: 111.0, pop: 70_000 },
        ]
    );
    assert_eq!(assessment.exposure.deaths_estimate, 7_000);
}

#[tokio::test]
async fn offline_chain_reports_zero_exposure() {
    let mut config = ServiceConfig::load(fixture_path()).unwrap();
    // no username: the directory provider answers empty without a request
    config.providers.chain = vec![ProviderKind::Geonames];
    let service = ImpactService::from_config(&config).unwrap();

    let report = service
        .estimate_exposure(-33.87, 151.21, &[5.0, 1.0], None)
        .await
        .unwrap();

    assert_eq!(report.deaths_estimate, 0);
    assert_eq!(report.source, None);
    assert!(report.by_radius.iter().all(|entry| entry.pop == 0));
}

#[tokio::test]
async fn invalid_requests_fail_before_any_provider() {
    let service = ImpactService::new(ExposureAggregator::new(0.35).with_samples(TwoTowns));
    let params = ImpactParameters::new(-1.0, 19.0, 45.0, ImpactMedium::Water);
    assert!(matches!(
        service.assess(&params, 0.0, 0.0, None).await,
        Err(ImpactError::InvalidParameter(_))
    ));
    assert!(matches!(
        service.estimate_exposure(91.0, 0.0, &[1.0], None).await,
        Err(ImpactError::InvalidQuery(_))
    ));
    assert!(matches!(
        service.estimate_exposure(0.0, 0.0, &[0.0], None).await,
        Err(ImpactError::InvalidQuery(_))
    ));
}

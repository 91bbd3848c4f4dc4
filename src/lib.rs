pub mod config;
pub mod error;
pub mod exposure;
pub mod geo;
pub mod impact;
pub mod logging;
pub mod mitigation;
pub mod neo;
pub mod providers;
pub mod service;
pub mod web;

pub use config::ServiceConfig;
pub use error::{ImpactError, ProviderError};
pub use exposure::{ExposureAggregator, ExposureReport};
pub use geo::GeoPoint;
pub use impact::{compute_damage_radii, DamageRadii, ImpactMedium, ImpactParameters};
pub use service::{ImpactAssessment, ImpactService};

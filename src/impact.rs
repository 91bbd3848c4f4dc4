//! Impact energy and damage radius model.
//!
//! The impactor is a sphere of fixed bulk density. Its kinetic energy is
//! converted to megatons of TNT and the severe damage radius scales with the
//! cube root of that yield. Major and light radii are fixed multiples of the
//! severe radius.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ImpactError;

const BULK_DENSITY_KG_M3: f64 = 3000.0;
const JOULES_PER_MEGATON: f64 = 4.184e15;
const SEVERE_RADIUS_BASE_KM: f64 = 6.0;
const MIN_ANGLE_FACTOR: f64 = 0.3;
const MAJOR_RATIO: f64 = 1.8;
const LIGHT_RATIO: f64 = 3.2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactMedium {
    #[default]
    Ground,
    Airburst,
    Water,
}

impl ImpactMedium {
    /// Coupling efficiency relative to a ground impact.
    pub fn factor(self) -> f64 {
        match self {
            ImpactMedium::Ground => 1.0,
            ImpactMedium::Airburst => 1.2,
            ImpactMedium::Water => 0.9,
        }
    }
}

impl std::str::FromStr for ImpactMedium {
    type Err = ImpactError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ground" => Ok(ImpactMedium::Ground),
            "airburst" => Ok(ImpactMedium::Airburst),
            "water" => Ok(ImpactMedium::Water),
            other => Err(ImpactError::InvalidParameter(format!(
                "unknown impact medium '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactParameters {
    pub diameter_m: f64,
    pub speed_kms: f64,
    #[serde(default = "default_angle_deg")]
    pub angle_deg: f64,
    #[serde(default, rename = "type")]
    pub medium: ImpactMedium,
}

fn default_angle_deg() -> f64 {
    45.0
}

impl ImpactParameters {
    pub fn new(diameter_m: f64, speed_kms: f64, angle_deg: f64, medium: ImpactMedium) -> Self {
        Self {
            diameter_m,
            speed_kms,
            angle_deg,
            medium,
        }
    }

    pub fn validate(&self) -> Result<(), ImpactError> {
        if !self.diameter_m.is_finite() || self.diameter_m <= 0.0 {
            return Err(ImpactError::InvalidParameter(format!(
                "diameter must be a positive number of meters, got {}",
                self.diameter_m
            )));
        }
        if !self.speed_kms.is_finite() || self.speed_kms <= 0.0 {
            return Err(ImpactError::InvalidParameter(format!(
                "speed must be a positive number of km/s, got {}",
                self.speed_kms
            )));
        }
        if !self.angle_deg.is_finite() || !(0.0..=90.0).contains(&self.angle_deg) {
            return Err(ImpactError::InvalidParameter(format!(
                "entry angle must be within [0, 90] degrees, got {}",
                self.angle_deg
            )));
        }
        Ok(())
    }

    pub fn mass_kg(&self) -> f64 {
        (PI / 6.0) * self.diameter_m.powi(3) * BULK_DENSITY_KG_M3
    }

    pub fn kinetic_energy_joules(&self) -> f64 {
        let v = self.speed_kms * 1000.0;
        0.5 * self.mass_kg() * v * v
    }

    /// Sine of the entry angle, floored so grazing entries stay meaningful.
    pub fn angle_factor(&self) -> f64 {
        self.angle_deg.to_radians().sin().max(MIN_ANGLE_FACTOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageRadii {
    pub severe_km: f64,
    pub major_km: f64,
    pub light_km: f64,
    pub energy_mt: f64,
}

impl DamageRadii {
    /// Radii as an exposure query: whole kilometers, never below 1 km.
    pub fn query_radii_km(&self) -> Vec<f64> {
        [self.severe_km, self.major_km, self.light_km]
            .into_iter()
            .map(|r| r.round().max(1.0))
            .collect()
    }
}

pub fn compute_damage_radii(params: &ImpactParameters) -> Result<DamageRadii, ImpactError> {
    params.validate()?;

    let energy_mt = params.kinetic_energy_joules() / JOULES_PER_MEGATON;
    let severe_km =
        energy_mt.cbrt() * SEVERE_RADIUS_BASE_KM * params.angle_factor() * params.medium.factor();
    let major_km = severe_km * MAJOR_RATIO;
    let light_km = severe_km * LIGHT_RATIO;

    Ok(DamageRadii {
        severe_km: round_to(severe_km, 1),
        major_km: round_to(major_km, 1),
        light_km: round_to(light_km, 1),
        energy_mt: round_to(energy_mt, 2),
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

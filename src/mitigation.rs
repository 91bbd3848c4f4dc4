//! What-if adjustments applied to an already computed assessment.
//!
//! These are illustrative scalings, not a physical model of deflection or
//! evacuation.

use serde::{Deserialize, Serialize};

use crate::impact::DamageRadii;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Mitigation {
    #[default]
    None,
    #[serde(rename_all = "camelCase")]
    Deflection { delta_v_mm_s: f64, lead_years: f64 },
    #[serde(rename_all = "camelCase")]
    Evacuation { radius_km: f64, coverage_pct: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MitigatedOutcome {
    pub radii: DamageRadii,
    pub affected: u64,
    pub deaths: u64,
}

const MAX_DEFLECTION_REDUCTION: f64 = 0.7;
const EVACUATION_DEATH_REDUCTION: f64 = 0.7;
const EVACUATION_AFFECTED_REDUCTION: f64 = 0.3;

impl Mitigation {
    /// `affected` and `deaths` are the unmitigated severe-zone figures.
    pub fn apply(&self, radii: &DamageRadii, affected: u64, deaths: u64) -> MitigatedOutcome {
        let severe_floor = radii.severe_km.max(1e-6);
        match *self {
            Mitigation::None => MitigatedOutcome {
                radii: *radii,
                affected,
                deaths,
            },
            Mitigation::Deflection {
                delta_v_mm_s,
                lead_years,
            } => {
                let effectiveness = ((delta_v_mm_s / 2.0) * (lead_years / 2.0)).clamp(0.0, 3.0);
                let factor = 1.0 - (0.18 * effectiveness).min(MAX_DEFLECTION_REDUCTION);
                let mitigated = DamageRadii {
                    severe_km: radii.severe_km * factor,
                    major_km: radii.major_km * factor,
                    light_km: radii.light_km * (0.85 + 0.15 * factor),
                    energy_mt: radii.energy_mt,
                };
                // affected area scales with the square of the radius
                let ratio = (mitigated.severe_km / severe_floor).powi(2).clamp(0.0, 1.0);
                MitigatedOutcome {
                    radii: mitigated,
                    affected: scale(affected, ratio),
                    deaths: scale(deaths, ratio),
                }
            }
            Mitigation::Evacuation {
                radius_km,
                coverage_pct,
            } => {
                let covered = (coverage_pct / 100.0).clamp(0.0, 1.0);
                let overlap = (radius_km / severe_floor).clamp(0.0, 1.0);
                MitigatedOutcome {
                    radii: *radii,
                    affected: scale(
                        affected,
                        1.0 - EVACUATION_AFFECTED_REDUCTION * overlap * covered,
                    ),
                    deaths: scale(deaths, 1.0 - EVACUATION_DEATH_REDUCTION * overlap * covered),
                }
            }
        }
    }
}

fn scale(value: u64, factor: f64) -> u64 {
    (value as f64 * factor).round().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn radii() -> DamageRadii {
        DamageRadii {
            severe_km: 10.0,
            major_km: 18.0,
            light_km: 32.0,
            energy_mt: 20.0,
        }
    }

    #[test]
    fn none_is_identity() {
        let outcome = Mitigation::None.apply(&radii(), 1000, 350);
        assert_eq!(outcome.radii, radii());
        assert_eq!((outcome.affected, outcome.deaths), (1000, 350));
    }

    #[test]
    fn deflection_caps_reduction() {
        let strong = Mitigation::Deflection {
            delta_v_mm_s: 50.0,
            lead_years: 50.0,
        }
        .apply(&radii(), 1000, 350);
        // effectiveness clamps at 3 → factor 1 - 0.54
        assert!((strong.radii.severe_km - 4.6).abs() < 1e-9);
        assert!((strong.radii.light_km - 32.0 * (0.85 + 0.15 * 0.46)).abs() < 1e-9);
        assert_eq!(strong.affected, (1000.0 * 0.46_f64.powi(2)).round() as u64);

        let weak = Mitigation::Deflection {
            delta_v_mm_s: 1.0,
            lead_years: 2.0,
        }
        .apply(&radii(), 1000, 350);
        assert!((weak.radii.severe_km - 10.0 * (1.0 - 0.09)).abs() < 1e-9);
        assert!(weak.deaths < 350);
    }

    #[test]
    fn evacuation_reduces_deaths_more_than_exposure() {
        let outcome = Mitigation::Evacuation {
            radius_km: 20.0,
            coverage_pct: 50.0,
        }
        .apply(&radii(), 1000, 350);
        assert_eq!(outcome.radii, radii());
        assert_eq!(outcome.deaths, 228);
        assert_eq!(outcome.affected, 850);
    }

    #[test]
    fn deserializes_tagged_strategy() {
        let m: Mitigation =
            serde_json::from_str(r#"{"strategy":"deflection","deltaVMmS":2.0,"leadYears":4.0}"#)
                .unwrap();
        assert_eq!(
            m,
            Mitigation::Deflection {
                delta_v_mm_s: 2.0,
                lead_years: 4.0
            }
        );
    }
}

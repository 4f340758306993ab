use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fields::Field;

/// Scale applied to the summed excess risk: `(10 / 10.4) * 100`.
pub const AQHI_SCALE: f64 = (10.0 / 10.4) * 100.0;

/// Exponential risk coefficients per unit concentration, in source units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    #[serde(default = "default_no2")]
    pub no2: f64,
    #[serde(default = "default_o3")]
    pub o3: f64,
    #[serde(default = "default_pm2_5")]
    pub pm2_5: f64,
}

fn default_no2() -> f64 {
    0.000871
}

fn default_o3() -> f64 {
    0.000537
}

fn default_pm2_5() -> f64 {
    0.000487
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            no2: default_no2(),
            o3: default_o3(),
            pm2_5: default_pm2_5(),
        }
    }
}

/// One of the three regulated pollutants that drive the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pollutant {
    #[serde(rename = "NO2")]
    No2,
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "PM2_5")]
    Pm2_5,
}

impl Pollutant {
    pub fn field(self) -> Field {
        match self {
            Pollutant::No2 => Field::No2,
            Pollutant::O3 => Field::O3,
            Pollutant::Pm2_5 => Field::Pm2_5,
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field().name())
    }
}

/// Trailing means of the three inputs at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingMeans {
    pub no2: f64,
    pub o3: f64,
    pub pm2_5: f64,
}

/// Excess-risk terms `exp(beta * mean) - 1` for each pollutant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskTerms {
    pub no2: f64,
    pub o3: f64,
    pub pm2_5: f64,
}

impl RiskTerms {
    pub fn from_means(means: &TrailingMeans, coefficients: &Coefficients) -> Self {
        Self {
            no2: (coefficients.no2 * means.no2).exp_m1(),
            o3: (coefficients.o3 * means.o3).exp_m1(),
            pm2_5: (coefficients.pm2_5 * means.pm2_5).exp_m1(),
        }
    }

    pub fn total(&self) -> f64 {
        self.no2 + self.o3 + self.pm2_5
    }

    /// Pollutant with the largest term. Ties go to NO2, then O3.
    pub fn dominant(&self) -> Pollutant {
        let mut best = (Pollutant::No2, self.no2);
        for candidate in [(Pollutant::O3, self.o3), (Pollutant::Pm2_5, self.pm2_5)] {
            if candidate.1 > best.1 {
                best = candidate;
            }
        }
        best.0
    }
}

/// Composite index and its main driver at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AqhiValue {
    pub aqhi: f64,
    pub dominant: Pollutant,
}

pub fn compute(means: &TrailingMeans, coefficients: &Coefficients) -> AqhiValue {
    let terms = RiskTerms::from_means(means, coefficients);
    AqhiValue {
        aqhi: AQHI_SCALE * terms.total(),
        dominant: terms.dominant(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_value() {
        let means = TrailingMeans {
            no2: 20.0,
            o3: 30.0,
            pm2_5: 10.0,
        };
        let expected = (10.0 / 10.4)
            * 100.0
            * (((0.000871f64 * 20.0).exp() - 1.0)
                + ((0.000537f64 * 30.0).exp() - 1.0)
                + ((0.000487f64 * 10.0).exp() - 1.0));

        let value = compute(&means, &Coefficients::default());

        assert!((value.aqhi - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_means_give_zero_index() {
        let means = TrailingMeans {
            no2: 0.0,
            o3: 0.0,
            pm2_5: 0.0,
        };
        assert_eq!(compute(&means, &Coefficients::default()).aqhi, 0.0);
    }

    #[test]
    fn test_dominant_follows_risk_not_concentration() {
        let c = Coefficients::default();
        let no2 = TrailingMeans {
            no2: 100.0,
            o3: 10.0,
            pm2_5: 5.0,
        };
        let o3 = TrailingMeans {
            no2: 5.0,
            o3: 100.0,
            pm2_5: 10.0,
        };
        let pm = TrailingMeans {
            no2: 5.0,
            o3: 10.0,
            pm2_5: 100.0,
        };
        assert_eq!(compute(&no2, &c).dominant, Pollutant::No2);
        assert_eq!(compute(&o3, &c).dominant, Pollutant::O3);
        assert_eq!(compute(&pm, &c).dominant, Pollutant::Pm2_5);

        // PM2.5 has the highest concentration here, but NO2's coefficient
        // makes its term larger
        let mixed = TrailingMeans {
            no2: 60.0,
            o3: 0.0,
            pm2_5: 100.0,
        };
        assert_eq!(compute(&mixed, &c).dominant, Pollutant::No2);
    }

    #[test]
    fn test_ties_resolve_in_fixed_order() {
        let terms = RiskTerms {
            no2: 0.1,
            o3: 0.1,
            pm2_5: 0.1,
        };
        assert_eq!(terms.dominant(), Pollutant::No2);
        let terms = RiskTerms {
            no2: 0.0,
            o3: 0.2,
            pm2_5: 0.2,
        };
        assert_eq!(terms.dominant(), Pollutant::O3);
    }

    #[test]
    fn test_monotonic_in_each_mean() {
        let c = Coefficients::default();
        let base = TrailingMeans {
            no2: 15.0,
            o3: 25.0,
            pm2_5: 8.0,
        };
        let base_aqhi = compute(&base, &c).aqhi;

        for step in [0.5, 5.0, 50.0] {
            let mut m = base;
            m.no2 += step;
            assert!(compute(&m, &c).aqhi >= base_aqhi);
            let mut m = base;
            m.o3 += step;
            assert!(compute(&m, &c).aqhi >= base_aqhi);
            let mut m = base;
            m.pm2_5 += step;
            assert!(compute(&m, &c).aqhi >= base_aqhi);
        }
    }

    #[test]
    fn test_coefficients_deserialize_with_defaults() {
        let c: Coefficients = serde_json::from_str(r#"{"no2": 0.001}"#).unwrap();
        assert_eq!(c.no2, 0.001);
        assert_eq!(c.o3, 0.000537);
        assert_eq!(c.pm2_5, 0.000487);
    }
}

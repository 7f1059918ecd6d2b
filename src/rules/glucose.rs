//! Glucose units and the rule-based status classifier.
//!
//! Thresholds are kept per unit and values are compared in the unit they
//! were recorded in. Each band is inclusive on its upper bound, so a
//! boundary value resolves to the less severe band.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// mg/dL per mmol/L for glucose.
pub const MGDL_PER_MMOL: f64 = 18.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "glucose_unit")]
pub enum GlucoseUnit {
    #[serde(rename = "mmol/L")]
    #[sqlx(rename = "mmol/L")]
    MmolL,
    #[serde(rename = "mg/dL")]
    #[sqlx(rename = "mg/dL")]
    MgDl,
}

impl GlucoseUnit {
    pub fn label(self) -> &'static str {
        match self {
            GlucoseUnit::MmolL => "mmol/L",
            GlucoseUnit::MgDl => "mg/dL",
        }
    }

    /// Upper bounds of the low, normal and high bands.
    fn thresholds(self) -> Thresholds {
        match self {
            GlucoseUnit::MmolL => Thresholds { low_below: 4.0, normal_max: 7.0, high_max: 10.0 },
            GlucoseUnit::MgDl => Thresholds { low_below: 70.0, normal_max: 126.0, high_max: 180.0 },
        }
    }
}

impl fmt::Display for GlucoseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for GlucoseUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mmol/l" => Ok(GlucoseUnit::MmolL),
            "mg/dl" => Ok(GlucoseUnit::MgDl),
            other => Err(format!("Unsupported glucose unit '{}'", other)),
        }
    }
}

/// Severity band of a single reading.
///
/// `VeryLow` is part of the stored vocabulary but [`classify`] never
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "glucose_status")]
pub enum GlucoseStatus {
    #[sqlx(rename = "very-low")]
    VeryLow,
    #[sqlx(rename = "low")]
    Low,
    #[sqlx(rename = "normal")]
    Normal,
    #[sqlx(rename = "high")]
    High,
    #[sqlx(rename = "very-high")]
    VeryHigh,
}

impl GlucoseStatus {
    pub fn is_elevated(self) -> bool {
        matches!(self, GlucoseStatus::High | GlucoseStatus::VeryHigh)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GlucoseStatus::VeryLow => "very-low",
            GlucoseStatus::Low => "low",
            GlucoseStatus::Normal => "normal",
            GlucoseStatus::High => "high",
            GlucoseStatus::VeryHigh => "very-high",
        }
    }
}

impl fmt::Display for GlucoseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlucoseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "very-low" => Ok(GlucoseStatus::VeryLow),
            "low" => Ok(GlucoseStatus::Low),
            "normal" => Ok(GlucoseStatus::Normal),
            "high" => Ok(GlucoseStatus::High),
            "very-high" => Ok(GlucoseStatus::VeryHigh),
            other => Err(format!("Unknown reading status '{}'", other)),
        }
    }
}

struct Thresholds {
    low_below: f64,
    normal_max: f64,
    high_max: f64,
}

/// Maps a value in `unit` to its severity band. Total over all `f64`;
/// callers reject non-finite input before persisting a reading.
pub fn classify(value: f64, unit: GlucoseUnit) -> GlucoseStatus {
    let t = unit.thresholds();
    if value < t.low_below {
        GlucoseStatus::Low
    } else if value <= t.normal_max {
        GlucoseStatus::Normal
    } else if value <= t.high_max {
        GlucoseStatus::High
    } else {
        GlucoseStatus::VeryHigh
    }
}

pub fn to_mmol(value: f64, unit: GlucoseUnit) -> f64 {
    match unit {
        GlucoseUnit::MmolL => value,
        GlucoseUnit::MgDl => value / MGDL_PER_MMOL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mmol_bands() {
        assert_eq!(classify(3.9, GlucoseUnit::MmolL), GlucoseStatus::Low);
        assert_eq!(classify(5.5, GlucoseUnit::MmolL), GlucoseStatus::Normal);
        assert_eq!(classify(7.8, GlucoseUnit::MmolL), GlucoseStatus::High);
        assert_eq!(classify(12.0, GlucoseUnit::MmolL), GlucoseStatus::VeryHigh);
    }

    #[test]
    fn test_mmol_boundaries_resolve_to_lower_band() {
        assert_eq!(classify(4.0, GlucoseUnit::MmolL), GlucoseStatus::Normal);
        assert_eq!(classify(7.0, GlucoseUnit::MmolL), GlucoseStatus::Normal);
        assert_eq!(classify(10.0, GlucoseUnit::MmolL), GlucoseStatus::High);
    }

    #[test]
    fn test_mgdl_boundaries_resolve_to_lower_band() {
        assert_eq!(classify(69.9, GlucoseUnit::MgDl), GlucoseStatus::Low);
        assert_eq!(classify(70.0, GlucoseUnit::MgDl), GlucoseStatus::Normal);
        assert_eq!(classify(126.0, GlucoseUnit::MgDl), GlucoseStatus::Normal);
        assert_eq!(classify(126.1, GlucoseUnit::MgDl), GlucoseStatus::High);
        assert_eq!(classify(180.0, GlucoseUnit::MgDl), GlucoseStatus::High);
        assert_eq!(classify(180.1, GlucoseUnit::MgDl), GlucoseStatus::VeryHigh);
    }

    #[test]
    fn test_no_cross_unit_conversion() {
        // 7.8 is high in mmol/L but low in mg/dL
        assert_eq!(classify(7.8, GlucoseUnit::MgDl), GlucoseStatus::Low);
    }

    #[test]
    fn test_classifier_never_produces_very_low() {
        for v in [-50.0, 0.0, 0.5, 1.9, 2.9, f64::NEG_INFINITY] {
            for unit in [GlucoseUnit::MmolL, GlucoseUnit::MgDl] {
                assert_eq!(classify(v, unit), GlucoseStatus::Low);
            }
        }
    }

    #[test]
    fn test_classifier_is_total() {
        assert_eq!(classify(f64::INFINITY, GlucoseUnit::MmolL), GlucoseStatus::VeryHigh);
        assert_eq!(classify(f64::NAN, GlucoseUnit::MgDl), GlucoseStatus::VeryHigh);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("mmol/L".parse::<GlucoseUnit>().unwrap(), GlucoseUnit::MmolL);
        assert_eq!("MG/DL".parse::<GlucoseUnit>().unwrap(), GlucoseUnit::MgDl);
        assert!("mmHg".parse::<GlucoseUnit>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&GlucoseUnit::MmolL).unwrap(), "\"mmol/L\"");
        assert_eq!(serde_json::to_string(&GlucoseStatus::VeryHigh).unwrap(), "\"very-high\"");
        let status: GlucoseStatus = serde_json::from_str("\"very-low\"").unwrap();
        assert_eq!(status, GlucoseStatus::VeryLow);
    }

    #[test]
    fn test_to_mmol() {
        assert_eq!(to_mmol(6.2, GlucoseUnit::MmolL), 6.2);
        assert!((to_mmol(180.0, GlucoseUnit::MgDl) - 10.0).abs() < 1e-9);
    }
}

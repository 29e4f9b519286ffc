//! Static standard tables: TS 802 grading envelopes, TS EN 206 exposure
//! classes, concrete strength classes and the regional lithology table.
//!
//! The built-in tables match the values plant engineers use by default. A TOML
//! file with the same shape can replace them wholesale.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MixError, ValidationError};

pub const DEFAULT_EXPOSURE_CLASS: &str = "XC3";
pub const DEFAULT_CONCRETE_CLASS: &str = "C30/37";
pub const DEFAULT_ASR_STATUS: &str = "No correction needed";

/// Tabulated sizes closer than this are the same sieve.
pub(crate) const SIZE_TOLERANCE: f64 = 1e-9;

/// TS 802 reference curve: A is the coarse limit, B the ideal, C the fine limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveType {
    A,
    B,
    C,
}

impl fmt::Display for CurveType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            CurveType::A => "A",
            CurveType::B => "B",
            CurveType::C => "C",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for CurveType {
    type Err = MixError;

    /// Accepts the bare letter or a labelled form such as `"B (ideal)"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('A') => Ok(CurveType::A),
            Some('B') => Ok(CurveType::B),
            Some('C') => Ok(CurveType::C),
            _ => Err(MixError::UnknownCurveType(s.to_string())),
        }
    }
}

/// Passing-percentage limits at one tabulated sieve size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, f64)", into = "(f64, f64, f64)")]
pub struct EnvelopePoint {
    pub size: f64,
    pub lower: f64,
    pub upper: f64,
}

impl From<(f64, f64, f64)> for EnvelopePoint {
    fn from((size, lower, upper): (f64, f64, f64)) -> Self {
        EnvelopePoint { size, lower, upper }
    }
}

impl From<EnvelopePoint> for (f64, f64, f64) {
    fn from(p: EnvelopePoint) -> Self {
        (p.size, p.lower, p.upper)
    }
}

/// Tabulated envelope for one (Dmax, curve) pair, points ordered largest size first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingEnvelope {
    pub dmax: f64,
    pub curve: CurveType,
    pub points: Vec<EnvelopePoint>,
}

impl GradingEnvelope {
    fn new(dmax: f64, curve: CurveType, points: &[(f64, f64, f64)]) -> Self {
        GradingEnvelope {
            dmax,
            curve,
            points: points.iter().map(|p| EnvelopePoint::from(*p)).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.points.is_empty() {
            return Err(ValidationError::new(&format!(
                "envelope {} / {} has no points",
                self.dmax, self.curve
            )));
        }
        for p in &self.points {
            if p.lower > p.upper {
                return Err(ValidationError::new(&format!(
                    "envelope {} / {}: lower {} exceeds upper {} at {} mm",
                    self.dmax, self.curve, p.lower, p.upper, p.size
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureLimits {
    pub max_wc: f64,
    pub min_cement: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassLimits {
    /// Characteristic cube strength, MPa.
    pub min_strength: f64,
    pub max_wc: f64,
    pub min_cement: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lithology {
    pub name: String,
    /// Bond/performance multiplier applied to theoretical strength.
    pub strength_factor: f64,
    pub asr_risk: String,
}

/// Limits resolved for one design: the exposure class and the strength class
/// actually used, after any fallback.
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceLimits {
    pub exposure_class: String,
    pub exposure: ExposureLimits,
    pub target_class: String,
    pub class: ClassLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardTables {
    pub grading: Vec<GradingEnvelope>,
    pub exposure: BTreeMap<String, ExposureLimits>,
    pub classes: BTreeMap<String, ClassLimits>,
    #[serde(default)]
    pub lithologies: Vec<Lithology>,
}

impl StandardTables {
    pub fn from_toml_str(content: &str) -> Result<StandardTables, MixError> {
        let mut tables: StandardTables = toml::from_str(content)?;
        for env in tables.grading.iter_mut() {
            env.points
                .sort_by(|a, b| b.size.partial_cmp(&a.size).unwrap_or(std::cmp::Ordering::Equal));
        }
        Ok(tables)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<StandardTables, MixError> {
        let content = fs::read_to_string(path)?;
        StandardTables::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.grading.is_empty() {
            return Err(ValidationError::new("grading table must not be empty"));
        }
        for env in &self.grading {
            env.validate()?;
        }
        if !self.exposure.contains_key(DEFAULT_EXPOSURE_CLASS) {
            return Err(ValidationError::new(&format!(
                "exposure table must define the fallback class {}",
                DEFAULT_EXPOSURE_CLASS
            )));
        }
        if !self.classes.contains_key(DEFAULT_CONCRETE_CLASS) {
            return Err(ValidationError::new(&format!(
                "class table must define the fallback class {}",
                DEFAULT_CONCRETE_CLASS
            )));
        }
        Ok(())
    }

    pub fn envelope(&self, dmax: f64, curve: CurveType) -> Result<&GradingEnvelope, MixError> {
        self.grading
            .iter()
            .find(|e| e.curve == curve && (e.dmax - dmax).abs() < SIZE_TOLERANCE)
            .ok_or(MixError::UnknownEnvelope { dmax, curve })
    }

    /// Resolves exposure and strength-class limits, falling back to
    /// `XC3` / `C30/37` for names missing from the tables.
    pub fn compliance_limits(
        &self,
        target_class: &str,
        exposure_class: &str,
    ) -> Result<ComplianceLimits, MixError> {
        let (exposure_key, exposure) =
            resolve(&self.exposure, exposure_class, DEFAULT_EXPOSURE_CLASS)
                .ok_or_else(|| MixError::UnknownExposureClass(exposure_class.to_string()))?;
        let (class_key, class) = resolve(&self.classes, target_class, DEFAULT_CONCRETE_CLASS)
            .ok_or_else(|| MixError::UnknownConcreteClass(target_class.to_string()))?;
        Ok(ComplianceLimits {
            exposure_class: exposure_key,
            exposure: exposure.clone(),
            target_class: class_key,
            class: class.clone(),
        })
    }

    pub fn class_limits(&self, target_class: &str) -> Option<&ClassLimits> {
        resolve(&self.classes, target_class, DEFAULT_CONCRETE_CLASS).map(|(_, c)| c)
    }

    fn lithology(&self, name: &str) -> Option<&Lithology> {
        self.lithologies.iter().find(|l| l.name == name)
    }

    /// 1.0 for lithologies not in the table.
    pub fn lithology_factor(&self, name: &str) -> f64 {
        self.lithology(name).map(|l| l.strength_factor).unwrap_or(1.0)
    }

    pub fn asr_risk(&self, name: &str) -> Option<&str> {
        self.lithology(name).map(|l| l.asr_risk.as_str())
    }
}

fn resolve<'a, T>(
    table: &'a BTreeMap<String, T>,
    key: &str,
    fallback: &str,
) -> Option<(String, &'a T)> {
    if let Some(value) = table.get(key) {
        return Some((key.to_string(), value));
    }
    let value = table.get(fallback)?;
    tracing::warn!(requested = key, fallback, "unknown table key, using fallback");
    Some((fallback.to_string(), value))
}

impl Default for StandardTables {
    fn default() -> Self {
        use CurveType::*;
        // Dmax 31.5 and 22.4 share the DIN 1045 reference curves.
        let coarse_a: &[(f64, f64, f64)] = &[
            (40.0, 100.0, 100.0), (31.5, 94.0, 94.0), (22.4, 86.0, 86.0), (16.0, 72.0, 72.0),
            (11.2, 57.0, 57.0), (8.0, 41.0, 41.0), (4.0, 29.0, 29.0), (2.0, 20.0, 20.0),
            (1.0, 14.0, 14.0), (0.5, 10.0, 10.0), (0.25, 6.0, 6.0), (0.15, 3.0, 3.0),
            (0.063, 1.0, 1.0), (0.0, 0.0, 0.0),
        ];
        let coarse_b: &[(f64, f64, f64)] = &[
            (40.0, 100.0, 100.0), (31.5, 100.0, 100.0), (22.4, 100.0, 100.0), (16.0, 92.0, 92.0),
            (11.2, 79.0, 79.0), (8.0, 63.0, 63.0), (4.0, 49.0, 49.0), (2.0, 37.0, 37.0),
            (1.0, 28.0, 28.0), (0.5, 20.0, 20.0), (0.25, 13.0, 13.0), (0.15, 7.0, 7.0),
            (0.063, 3.0, 3.0), (0.0, 0.0, 1.0),
        ];
        let coarse_c: &[(f64, f64, f64)] = &[
            (40.0, 100.0, 100.0), (31.5, 98.0, 98.0), (22.4, 96.0, 96.0), (16.0, 91.0, 91.0),
            (11.2, 82.0, 82.0), (8.0, 71.0, 71.0), (4.0, 59.0, 59.0), (2.0, 48.0, 48.0),
            (1.0, 38.0, 38.0), (0.5, 28.0, 28.0), (0.25, 18.0, 18.0), (0.15, 10.0, 10.0),
            (0.063, 5.0, 5.0), (0.0, 0.0, 2.0),
        ];
        let grading = vec![
            GradingEnvelope::new(31.5, A, coarse_a),
            GradingEnvelope::new(31.5, B, coarse_b),
            GradingEnvelope::new(31.5, C, coarse_c),
            GradingEnvelope::new(22.4, A, coarse_a),
            GradingEnvelope::new(22.4, B, coarse_b),
            GradingEnvelope::new(22.4, C, coarse_c),
            GradingEnvelope::new(16.0, A, &[
                (16.0, 100.0, 100.0), (8.0, 55.0, 70.0), (4.0, 35.0, 50.0), (2.0, 22.0, 38.0),
                (1.0, 12.0, 25.0), (0.25, 4.0, 12.0), (0.0, 0.0, 5.0),
            ]),
            GradingEnvelope::new(16.0, B, &[
                (16.0, 100.0, 100.0), (8.0, 70.0, 85.0), (4.0, 50.0, 62.0), (2.0, 35.0, 48.0),
                (1.0, 22.0, 32.0), (0.25, 8.0, 15.0), (0.0, 2.0, 6.0),
            ]),
            GradingEnvelope::new(16.0, C, &[
                (16.0, 100.0, 100.0), (8.0, 85.0, 95.0), (4.0, 62.0, 75.0), (2.0, 48.0, 60.0),
                (1.0, 32.0, 45.0), (0.25, 14.0, 24.0), (0.0, 4.0, 10.0),
            ]),
        ];

        let exposure = [
            ("X0", 1.00, 0.0, "No corrosion risk"),
            ("XC1", 0.65, 260.0, "Carbonation, dry or permanently wet"),
            ("XC2", 0.60, 280.0, "Carbonation, wet, rarely dry"),
            ("XC3", 0.55, 280.0, "Carbonation, moderate humidity"),
            ("XC4", 0.50, 300.0, "Carbonation, cyclic wet and dry"),
            ("XD1", 0.55, 300.0, "Chlorides, moderate humidity"),
            ("XD2", 0.50, 320.0, "Chlorides, wet, rarely dry"),
            ("XD3", 0.45, 340.0, "Chlorides, cyclic wet and dry"),
            ("XF1", 0.55, 300.0, "Freeze-thaw, moderate saturation, no de-icing agent"),
            ("XF2", 0.55, 300.0, "Freeze-thaw, moderate saturation, de-icing agent"),
            ("XF3", 0.50, 320.0, "Freeze-thaw, high saturation, no de-icing agent"),
            ("XF4", 0.45, 340.0, "Freeze-thaw, high saturation, de-icing agent, air required"),
        ]
        .into_iter()
        .map(|(k, max_wc, min_cement, d)| {
            (k.to_string(), ExposureLimits { max_wc, min_cement, description: d.to_string() })
        })
        .collect();

        let classes = [
            ("C20/25", 25.0, 0.60, 260.0, "Low strength class, exposure X0"),
            ("C25/30", 30.0, 0.60, 280.0, "Medium strength class, exposure XC1"),
            ("C30/37", 37.0, 0.55, 300.0, "Common structural concrete, exposure XC2/XC3"),
            ("C35/45", 45.0, 0.50, 320.0, "High strength and durability, exposure XD1/XS1"),
            ("C40/50", 50.0, 0.45, 340.0, "Special projects and bridges, exposure XD2/XS2"),
            ("C50/60+", 60.0, 0.40, 360.0, "Very high strength"),
        ]
        .into_iter()
        .map(|(k, min_strength, max_wc, min_cement, d)| {
            (
                k.to_string(),
                ClassLimits { min_strength, max_wc, min_cement, description: d.to_string() },
            )
        })
        .collect();

        let lithologies = [
            ("Basalt (Diyarbakir/Gaziantep)", 1.07, "Low (inert)"),
            ("Limestone (Mardin/Sanliurfa)", 0.98, "Low-medium"),
            ("River gravel (Tigris/Euphrates)", 0.95, "High (potentially reactive)"),
            ("Limestone (standard)", 1.00, "Low"),
            ("Basalt (standard)", 1.05, "Low"),
            ("Granite", 1.02, "Medium"),
        ]
        .into_iter()
        .map(|(name, strength_factor, asr)| Lithology {
            name: name.to_string(),
            strength_factor,
            asr_risk: asr.to_string(),
        })
        .collect();

        StandardTables { grading, exposure, classes, lithologies }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_type_parsing() {
        assert_eq!("B".parse::<CurveType>().unwrap(), CurveType::B);
        assert_eq!("a (coarse)".parse::<CurveType>().unwrap(), CurveType::A);
        assert_eq!(" C (fine)".parse::<CurveType>().unwrap(), CurveType::C);
        assert!("D".parse::<CurveType>().is_err());
        assert!("".parse::<CurveType>().is_err());
    }

    #[test]
    fn test_default_tables_are_valid() {
        let tables = StandardTables::default();
        assert!(tables.validate().is_ok());
        assert!(tables.envelope(31.5, CurveType::B).is_ok());
        assert!(tables.envelope(16.0, CurveType::C).is_ok());
        assert!(matches!(
            tables.envelope(63.0, CurveType::B),
            Err(MixError::UnknownEnvelope { .. })
        ));
    }

    #[test]
    fn test_compliance_limits_fall_back() {
        let tables = StandardTables::default();
        let limits = tables.compliance_limits("C35/45", "XD3").unwrap();
        assert_eq!(limits.exposure.max_wc, 0.45);
        assert_eq!(limits.class.min_strength, 45.0);

        let fallback = tables.compliance_limits("C99/99", "XZ9").unwrap();
        assert_eq!(fallback.exposure_class, "XC3");
        assert_eq!(fallback.target_class, "C30/37");
    }

    #[test]
    fn test_lithology_lookup() {
        let tables = StandardTables::default();
        assert_eq!(tables.lithology_factor("Granite"), 1.02);
        assert_eq!(tables.lithology_factor("Unknown rock"), 1.0);
        assert_eq!(
            tables.asr_risk("River gravel (Tigris/Euphrates)"),
            Some("High (potentially reactive)")
        );
    }

    #[test]
    fn test_tables_from_toml() {
        let content = r#"
            [[grading]]
            dmax = 16.0
            curve = "B"
            points = [[0.0, 2.0, 6.0], [16.0, 100.0, 100.0], [4.0, 50.0, 62.0]]

            [exposure.XC3]
            max_wc = 0.55
            min_cement = 280.0

            [classes."C30/37"]
            min_strength = 37.0
            max_wc = 0.55
            min_cement = 300.0
        "#;
        let tables = StandardTables::from_toml_str(content).unwrap();
        assert!(tables.validate().is_ok());
        let env = tables.envelope(16.0, CurveType::B).unwrap();
        let sizes: Vec<f64> = env.points.iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![16.0, 4.0, 0.0]);
        assert!(tables.lithologies.is_empty());
    }
}

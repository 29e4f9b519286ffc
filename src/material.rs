//! Aggregate fractions as measured by the lab: sieve analysis plus the
//! physical properties the compliance check weighs by blend proportion.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Sieve apertures in millimetres, largest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SieveSeries(Vec<f64>);

impl SieveSeries {
    /// Creates a series, rejecting empty or non strictly decreasing input.
    pub fn new(sizes: Vec<f64>) -> Result<SieveSeries, ValidationError> {
        let series = SieveSeries(sizes);
        series.validate()?;
        Ok(series)
    }

    /// The series used by the plant laboratory (TS EN 933-1 apertures).
    pub fn standard() -> SieveSeries {
        SieveSeries(vec![
            45.0, 40.0, 31.5, 22.4, 16.0, 11.2, 8.0, 4.0, 2.0, 1.0, 0.5, 0.25, 0.125, 0.063,
        ])
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            return Err(ValidationError::new("sieve series must not be empty"));
        }
        if let Some(size) = self.0.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(ValidationError::new(&format!(
                "sieve sizes must be positive, got {}",
                size
            )));
        }
        for pair in self.0.windows(2) {
            if pair[1] >= pair[0] {
                return Err(ValidationError::new(&format!(
                    "sieve series must be strictly decreasing, got {} after {}",
                    pair[1], pair[0]
                )));
            }
        }
        Ok(())
    }

    pub fn sizes(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether a fraction is a coarse aggregate or one of the sands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FractionKind {
    #[default]
    Coarse,
    Sand,
}

/// One aggregate fraction as entered by the lab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialSample {
    pub name: String,
    #[serde(default)]
    pub kind: FractionKind,
    /// Dry mass of the sieved specimen, grams.
    pub reference_mass: f64,
    /// Mass retained on each sieve, grams, aligned with the session's `SieveSeries`.
    #[serde(default)]
    pub retained: Vec<f64>,
    /// SSD particle density, t/m³.
    #[serde(default)]
    pub density: f64,
    /// Water absorption, percent.
    #[serde(default)]
    pub water_absorption: f64,
    /// Los Angeles abrasion loss, percent.
    #[serde(default)]
    pub abrasion_loss: f64,
    /// Methylene blue value, g/kg.
    #[serde(default)]
    pub methylene_blue: f64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl MaterialSample {
    /// Sands carry a minimum share in any optimized blend.
    pub fn is_fine_sand(&self) -> bool {
        self.kind == FractionKind::Sand
    }

    /// Retained masses padded with zeros or truncated to `sieve_count` entries.
    ///
    /// Partial lab entries are tolerated rather than rejected; a short array
    /// reads as nothing retained on the remaining sieves, which raises the
    /// computed passing on those sieves.
    pub fn repaired_retained(&self, sieve_count: usize) -> Vec<f64> {
        let mut retained = self.retained.clone();
        retained.resize(sieve_count, 0.0);
        retained
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("material name must not be empty"));
        }
        if self.density < 0.0 {
            return Err(ValidationError::new(&format!(
                "density of '{}' must not be negative, got {}",
                self.name, self.density
            )));
        }
        if !(0.0..=100.0).contains(&self.water_absorption) {
            return Err(ValidationError::new(&format!(
                "water_absorption of '{}' must be between 0 and 100, got {}",
                self.name, self.water_absorption
            )));
        }
        if !(0.0..=100.0).contains(&self.abrasion_loss) {
            return Err(ValidationError::new(&format!(
                "abrasion_loss of '{}' must be between 0 and 100, got {}",
                self.name, self.abrasion_loss
            )));
        }
        if self.methylene_blue < 0.0 {
            return Err(ValidationError::new(&format!(
                "methylene_blue of '{}' must not be negative, got {}",
                self.name, self.methylene_blue
            )));
        }
        if self.retained.iter().any(|m| *m < 0.0) {
            return Err(ValidationError::new(&format!(
                "retained masses of '{}' must not be negative",
                self.name
            )));
        }
        Ok(())
    }
}

/// Proportion-weighted property over the active materials:
/// Σ property_i × proportion_i / 100.
///
/// `proportions` is aligned with `materials`; missing entries count as zero.
pub fn weighted_property<F>(materials: &[MaterialSample], proportions: &[f64], property: F) -> f64
where
    F: Fn(&MaterialSample) -> f64,
{
    materials
        .iter()
        .zip(proportions.iter())
        .filter(|(m, _)| m.active)
        .map(|(m, p)| property(m) * p / 100.0)
        .sum()
}

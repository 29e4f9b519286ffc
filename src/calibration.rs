//! Per-plant site factor and plant reliability class.
//!
//! The site factor scales theoretical strength toward what a plant actually
//! achieves. It moves in two distinct ways:
//!
//! * `reactive_update` after each QC sample, ratio clamped to ±10% and the
//!   factor to \[0.80, 1.20\];
//! * `trend_evolve` as a periodic recalibration over the last ten paired
//!   results, damped to 30% of the mean ratio and bounded to \[0.70, 1.30\].
//!
//! Both call sites exist in production and no precedence between them is
//! defined, so they stay separate operations with their own constants.

use serde::Serialize;

use crate::strength::BatchRecord;

const REACTIVE_RATIO_BOUNDS: (f64, f64) = (0.9, 1.1);
const REACTIVE_FACTOR_BOUNDS: (f64, f64) = (0.80, 1.20);

const TREND_MIN_PAIRS: usize = 5;
const TREND_WINDOW: usize = 10;
const TREND_RETAINED: f64 = 0.7;
const TREND_FACTOR_BOUNDS: (f64, f64) = (0.70, 1.30);

const CLASS_MIN_RESIDUALS: usize = 5;
const CLASS_A_MAX_SIGMA: f64 = 3.0;
const CLASS_B_MAX_SIGMA: f64 = 5.0;

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Site factor after one QC sample with both a prediction and a result.
///
/// Non-positive or non-finite inputs leave the factor unchanged.
pub fn reactive_update(predicted: f64, measured: f64, old_factor: f64) -> f64 {
    if !(predicted > 0.0 && measured > 0.0 && predicted.is_finite() && measured.is_finite()) {
        return old_factor;
    }
    let ratio = (measured / predicted).clamp(REACTIVE_RATIO_BOUNDS.0, REACTIVE_RATIO_BOUNDS.1);
    let factor = (old_factor * ratio).clamp(REACTIVE_FACTOR_BOUNDS.0, REACTIVE_FACTOR_BOUNDS.1);
    round3(factor)
}

// (measured, predicted) for records carrying a positive prediction.
fn paired(history: &[BatchRecord]) -> impl Iterator<Item = (f64, f64)> + '_ {
    history.iter().filter_map(|r| match r.predicted_strength {
        Some(p) if p > 0.0 && r.measured_strength > 0.0 => Some((r.measured_strength, p)),
        _ => None,
    })
}

/// Periodic recalibration from the plant's recent history.
///
/// Needs five records with both values; then uses the last ten of them:
/// factor × (0.7 + 0.3 × mean(measured / predicted)), bounded and rounded
/// to three decimals.
pub fn trend_evolve(history: &[BatchRecord], current_factor: f64) -> f64 {
    let pairs: Vec<(f64, f64)> = paired(history).collect();
    if pairs.len() < TREND_MIN_PAIRS {
        return current_factor;
    }
    let window = &pairs[pairs.len().saturating_sub(TREND_WINDOW)..];
    let mean_ratio = window.iter().map(|(m, p)| m / p).sum::<f64>() / window.len() as f64;
    let factor = current_factor * (TREND_RETAINED + (1.0 - TREND_RETAINED) * mean_ratio);
    let bounded = factor.clamp(TREND_FACTOR_BOUNDS.0, TREND_FACTOR_BOUNDS.1);
    tracing::debug!(pairs = window.len(), mean_ratio, factor = bounded, "site factor evolved");
    round3(bounded)
}

/// Reliability of a plant judged by the scatter of its prediction residuals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum PlantClass {
    /// Fewer than five residuals and fewer than five records overall.
    InsufficientData,
    /// The pool has records but not enough paired results to measure scatter.
    PoolActive,
    /// σ < 3 MPa.
    A { sigma: f64 },
    /// 3 ≤ σ < 5 MPa.
    B { sigma: f64 },
    /// σ ≥ 5 MPa.
    C { sigma: f64 },
}

impl PlantClass {
    pub fn label(&self) -> &'static str {
        match self {
            PlantClass::InsufficientData => "insufficient data",
            PlantClass::PoolActive => "pool active, no residual signal",
            PlantClass::A { .. } => "class A (reliable)",
            PlantClass::B { .. } => "class B (moderate)",
            PlantClass::C { .. } => "class C (risky)",
        }
    }
}

/// Classifies a plant from measured − predicted residuals (sample standard deviation).
pub fn classify_plant(records: &[BatchRecord]) -> PlantClass {
    let residuals: Vec<f64> = paired(records).map(|(m, p)| m - p).collect();
    if residuals.len() < CLASS_MIN_RESIDUALS {
        if records.len() >= CLASS_MIN_RESIDUALS {
            return PlantClass::PoolActive;
        }
        return PlantClass::InsufficientData;
    }
    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    let sigma = (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
    if sigma < CLASS_A_MAX_SIGMA {
        PlantClass::A { sigma }
    } else if sigma < CLASS_B_MAX_SIGMA {
        PlantClass::B { sigma }
    } else {
        PlantClass::C { sigma }
    }
}

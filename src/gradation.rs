//! Sieve analysis: passing curves per fraction, blended curves, and the
//! deviation of a blend from its standard envelope.

use serde::Serialize;

use crate::interpolate::Limits;
use crate::material::MaterialSample;

/// Sieves finer than this are left out of the deviation total.
const DEVIATION_MIN_SIEVE: f64 = 0.1;
/// Per-sieve deviations up to this are tolerated.
const DEVIATION_TOLERANCE: f64 = 1.0;
/// A single sieve further out than this is a local violation.
const DEVIATION_LOCAL_LIMIT: f64 = 3.0;

/// Cumulative percent passing at each sieve of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GradationCurve(pub Vec<f64>);

impl GradationCurve {
    pub fn passing(&self) -> &[f64] {
        &self.0
    }
}

/// Percent passing from the masses retained on each sieve.
///
/// passing\[i\] = 100 − Σ retained\[..=i\] / reference_mass × 100, clamped to
/// \[0, 100\]. A non-positive reference mass yields 100% passing everywhere.
pub fn passing_from_retained(reference_mass: f64, retained: &[f64]) -> Vec<f64> {
    if reference_mass <= 0.0 {
        return vec![100.0; retained.len()];
    }
    retained
        .iter()
        .scan(0.0, |cumulative, mass| {
            *cumulative += mass;
            Some((100.0 - *cumulative / reference_mass * 100.0).clamp(0.0, 100.0))
        })
        .collect()
}

/// Passing curve of one fraction after repairing its retained masses to `sieve_count`.
pub fn material_curve(material: &MaterialSample, sieve_count: usize) -> GradationCurve {
    let retained = material.repaired_retained(sieve_count);
    GradationCurve(passing_from_retained(material.reference_mass, &retained))
}

/// Weighted sum Σ curve_i × proportion_i / 100 over active materials.
///
/// `curves`, `proportions` and `active` are aligned by material. The result
/// has the length of the longest curve; shorter curves contribute nothing past
/// their end.
pub fn blend_gradation(curves: &[GradationCurve], proportions: &[f64], active: &[bool]) -> GradationCurve {
    let len = curves.iter().map(|c| c.0.len()).max().unwrap_or(0);
    let mut blend = vec![0.0; len];
    for ((curve, p), is_active) in curves.iter().zip(proportions).zip(active) {
        if !is_active {
            continue;
        }
        for (b, passing) in blend.iter_mut().zip(curve.0.iter()) {
            *b += passing * p / 100.0;
        }
    }
    GradationCurve(blend)
}

/// How far a blend strays outside its envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GradingDeviation {
    /// Sum of per-sieve deviations that exceed the tolerance, percentage points.
    pub total: f64,
    /// Some sieve lies more than 3 points outside the envelope.
    pub local_violation: bool,
}

/// Deviation of `blend` from `limits` over the sieves of at least 0.1 mm.
pub fn grading_deviation(blend: &GradationCurve, limits: &Limits, sieves: &[f64]) -> GradingDeviation {
    let mut deviation = GradingDeviation::default();
    for (((size, passing), lower), upper) in sieves
        .iter()
        .zip(blend.0.iter())
        .zip(limits.lower.iter())
        .zip(limits.upper.iter())
    {
        if *size < DEVIATION_MIN_SIEVE {
            continue;
        }
        let diff = (lower - passing).max(0.0) + (passing - upper).max(0.0);
        if diff > DEVIATION_TOLERANCE {
            deviation.total += diff;
            if diff > DEVIATION_LOCAL_LIMIT {
                deviation.local_violation = true;
            }
        }
    }
    deviation
}

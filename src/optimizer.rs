//! Aggregate blend optimization and pool-based cement dosage suggestion.
//!
//! The blend problem is a constrained linear least-squares fit:
//!
//! ```text
//! minimize   Σ_sieves (Σ_i curve_i · w_i / 100 − target)²
//! subject to Σ_i w_i = 100,  lb_i ≤ w_i ≤ 100
//! ```
//!
//! where `lb_i` is 25 for sand fractions and 0 otherwise. The objective is
//! quadratic, so each SQP subproblem is the problem itself; it is solved with a
//! primal active-set method that starts from the equal split and keeps every
//! iterate feasible.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use thiserror::Error;

use crate::error::ValidationError;
use crate::gradation::GradationCurve;
use crate::material::MaterialSample;
use crate::strength::BatchRecord;

/// Minimum share of any sand fraction in an optimized blend, percent.
pub const SAND_MIN_SHARE: f64 = 25.0;
/// Allowed drift of user-set proportions from 100%.
pub const PROPORTION_TOLERANCE: f64 = 0.5;

const STEP_TOLERANCE: f64 = 1e-9;
const MULTIPLIER_TOLERANCE: f64 = 1e-9;
const MIN_POOL_SIZE: usize = 5;
const CEMENT_RANGE: (f64, f64) = (250.0, 500.0);
const PLAUSIBLE_WC: (f64, f64) = (0.3, 0.8);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("no active materials to blend")]
    NoActiveMaterials,
    #[error("sand minimums add up to {required:.1}%, more than the whole blend")]
    Infeasible { required: f64 },
    #[error("blend optimization did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },
}

/// Weight percent per material, aligned with the session's material list.
/// Inactive materials carry 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BlendProportions(pub Vec<f64>);

impl BlendProportions {
    pub fn weights(&self) -> &[f64] {
        &self.0
    }

    pub fn total(&self) -> f64 {
        self.0.iter().sum()
    }

    /// Checks user-set proportions: one per material, each in \[0, 100\],
    /// summing to 100 within `PROPORTION_TOLERANCE`.
    pub fn validate(&self, materials: &[MaterialSample]) -> Result<(), ValidationError> {
        if self.0.len() != materials.len() {
            return Err(ValidationError::new(&format!(
                "expected {} proportions, got {}",
                materials.len(),
                self.0.len()
            )));
        }
        if let Some(w) = self.0.iter().find(|w| !(0.0..=100.0).contains(*w)) {
            return Err(ValidationError::new(&format!(
                "proportions must be between 0 and 100, got {}",
                w
            )));
        }
        let total: f64 = self
            .0
            .iter()
            .zip(materials)
            .filter(|(_, m)| m.active)
            .map(|(w, _)| w)
            .sum();
        if (total - 100.0).abs() > PROPORTION_TOLERANCE {
            return Err(ValidationError::new(&format!(
                "proportions of active materials must sum to 100, got {}",
                total
            )));
        }
        Ok(())
    }
}

/// Fits active-material proportions to `target` (typically the envelope midpoint).
///
/// `curves` is aligned with `materials`. Failure is a value the caller reports,
/// e.g. by asking the user to change the active materials.
pub fn optimize_blend(
    target: &[f64],
    curves: &[GradationCurve],
    materials: &[MaterialSample],
) -> Result<BlendProportions, OptimizeError> {
    let active: Vec<usize> = materials
        .iter()
        .enumerate()
        .filter(|(_, m)| m.active)
        .map(|(i, _)| i)
        .filter(|i| *i < curves.len())
        .collect();
    if active.is_empty() {
        return Err(OptimizeError::NoActiveMaterials);
    }

    let n = active.len();
    let sieves = target.len();
    let a = DMatrix::from_fn(sieves, n, |s, j| {
        curves[active[j]].passing().get(s).copied().unwrap_or(0.0) / 100.0
    });
    let t = DVector::from_column_slice(target);

    let lower = DVector::from_iterator(
        n,
        active.iter().map(|&i| if materials[i].is_fine_sand() { SAND_MIN_SHARE } else { 0.0 }),
    );
    let required = lower.sum();
    if required > 100.0 + STEP_TOLERANCE {
        return Err(OptimizeError::Infeasible { required });
    }

    // Objective ½wᵀHw + gᵀw; the tiny ridge keeps H invertible when two
    // fractions have identical curves.
    let ata = a.transpose() * &a;
    let ridge = 1e-10 * (1.0 + ata.trace());
    let h = ata * 2.0 + DMatrix::identity(n, n) * ridge;
    let g = a.transpose() * &t * -2.0;

    let mut w = DVector::from_element(n, 100.0 / n as f64);
    if (0..n).any(|j| w[j] < lower[j]) {
        let slack = (100.0 - required) / n as f64;
        w = lower.map(|lb| lb + slack);
    }
    let mut at_bound: Vec<bool> = (0..n).map(|j| (w[j] - lower[j]).abs() < STEP_TOLERANCE).collect();

    let max_iterations = 50 * (n + 1);
    for iteration in 0..max_iterations {
        let gradient = &h * &w + &g;
        let free: Vec<usize> = (0..n).filter(|j| !at_bound[*j]).collect();
        if free.is_empty() {
            // Every share sits on its minimum and the minimums fill the blend.
            return Ok(expand(&w, &active, materials.len()));
        }

        let (step, multiplier) = match solve_equality_step(&h, &gradient, &free) {
            Some(solution) => solution,
            None => return Err(OptimizeError::NotConverged { iterations: iteration }),
        };

        if step.iter().all(|p| p.abs() < STEP_TOLERANCE) {
            // Stationary on the working set: release the bound with the most
            // negative multiplier, or stop.
            let released = (0..n)
                .filter(|j| at_bound[*j])
                .map(|j| (j, gradient[j] - multiplier))
                .filter(|(_, lambda)| *lambda < -MULTIPLIER_TOLERANCE)
                .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            match released {
                Some((j, _)) => at_bound[j] = false,
                None => {
                    if w.iter().any(|x| !x.is_finite()) {
                        return Err(OptimizeError::NotConverged { iterations: iteration });
                    }
                    tracing::debug!(iterations = iteration, materials = n, "blend optimization converged");
                    return Ok(expand(&w, &active, materials.len()));
                }
            }
            continue;
        }

        let mut alpha = 1.0;
        let mut blocking = None;
        for (k, &j) in free.iter().enumerate() {
            if step[k] < 0.0 {
                let limit = (lower[j] - w[j]) / step[k];
                if limit < alpha {
                    alpha = limit.max(0.0);
                    blocking = Some(j);
                }
            }
        }
        for (k, &j) in free.iter().enumerate() {
            w[j] += alpha * step[k];
        }
        if let Some(j) = blocking {
            w[j] = lower[j];
            at_bound[j] = true;
        }
    }

    tracing::debug!(iterations = max_iterations, "blend optimization hit the iteration limit");
    Err(OptimizeError::NotConverged { iterations: max_iterations })
}

// Solves the KKT system of the equality-constrained subproblem on the free set:
//   [H_FF 1] [p]   [-r_F]
//   [1ᵀ   0] [ν] = [ 0  ]
// and returns the step on the free set and the sum-constraint multiplier μ = −ν.
fn solve_equality_step(
    h: &DMatrix<f64>,
    gradient: &DVector<f64>,
    free: &[usize],
) -> Option<(DVector<f64>, f64)> {
    let k = free.len();
    let kkt = DMatrix::from_fn(k + 1, k + 1, |r, c| match (r < k, c < k) {
        (true, true) => h[(free[r], free[c])],
        (true, false) | (false, true) => 1.0,
        (false, false) => 0.0,
    });
    let rhs = DVector::from_fn(k + 1, |r, _| if r < k { -gradient[free[r]] } else { 0.0 });
    let solution = kkt.svd(true, true).solve(&rhs, 1e-12).ok()?;
    if solution.iter().any(|x| !x.is_finite()) {
        return None;
    }
    Some((solution.rows(0, k).into_owned(), -solution[k]))
}

fn expand(w: &DVector<f64>, active: &[usize], len: usize) -> BlendProportions {
    let mut weights = vec![0.0; len];
    for (k, &i) in active.iter().enumerate() {
        weights[i] = w[k];
    }
    BlendProportions(weights)
}

/// Mean water/cement ratio of pool records that reached `min_strength`,
/// rounded to three decimals. Ratios outside 0.3–0.8 are ignored as entry errors.
pub fn best_wc_estimate(records: &[BatchRecord], min_strength: f64) -> Option<f64> {
    let ratios: Vec<f64> = records
        .iter()
        .filter(|r| r.measured_strength >= min_strength && r.cement > 0.0 && r.water > 0.0)
        .map(|r| r.water / r.cement)
        .filter(|wc| *wc > PLAUSIBLE_WC.0 && *wc < PLAUSIBLE_WC.1)
        .collect();
    if ratios.is_empty() {
        return None;
    }
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    Some((mean * 1000.0).round() / 1000.0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CementSuggestion {
    pub wc: f64,
    pub water: f64,
    pub cement: f64,
}

/// Cement dosage that reproduces the pool's successful W/C at `reference_water`
/// litres, truncated to whole kilograms and kept within 250–500 kg.
///
/// Needs a pool of at least five records.
pub fn suggest_cement_dosage(
    records: &[BatchRecord],
    min_strength: f64,
    reference_water: f64,
) -> Option<CementSuggestion> {
    if records.len() < MIN_POOL_SIZE || reference_water <= 0.0 {
        return None;
    }
    let wc = best_wc_estimate(records, min_strength)?;
    let cement = (reference_water / wc).trunc().clamp(CEMENT_RANGE.0, CEMENT_RANGE.1);
    Some(CementSuggestion { wc, water: reference_water, cement })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradation::blend_gradation;
    use crate::interpolate::standard_limits;
    use crate::material::{FractionKind, SieveSeries};
    use crate::standards::{CurveType, StandardTables};
    use approx::assert_relative_eq;

    fn material(name: &str, kind: FractionKind, active: bool) -> MaterialSample {
        MaterialSample {
            name: name.to_string(),
            kind,
            reference_mass: 1000.0,
            retained: vec![],
            density: 2.65,
            water_absorption: 1.0,
            abrasion_loss: 25.0,
            methylene_blue: 0.5,
            active,
        }
    }

    // Passing curves of four typical fractions on the standard sieve series.
    fn fractions() -> (Vec<MaterialSample>, Vec<GradationCurve>) {
        let materials = vec![
            material("No:2 (15-25)", FractionKind::Coarse, true),
            material("No:1 (5-15)", FractionKind::Coarse, true),
            material("Crushed sand (0-5)", FractionKind::Sand, true),
            material("Natural sand (0-7)", FractionKind::Sand, true),
        ];
        let curves = vec![
            GradationCurve(vec![100.0, 100.0, 95.0, 45.0, 8.0, 2.0, 1.0, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5, 0.3]),
            GradationCurve(vec![100.0, 100.0, 100.0, 100.0, 92.0, 55.0, 20.0, 3.0, 1.0, 1.0, 1.0, 0.8, 0.6, 0.4]),
            GradationCurve(vec![100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 92.0, 62.0, 40.0, 26.0, 17.0, 12.0, 9.0]),
            GradationCurve(vec![100.0, 100.0, 100.0, 100.0, 100.0, 100.0, 98.0, 88.0, 72.0, 55.0, 35.0, 14.0, 6.0, 2.0]),
        ];
        (materials, curves)
    }

    #[test]
    fn test_optimized_blend_sums_to_100_and_respects_bounds() {
        let tables = StandardTables::default();
        let sieves = SieveSeries::standard();
        let target = standard_limits(&tables, 31.5, CurveType::B, sieves.sizes()).unwrap().midpoint();
        let (materials, curves) = fractions();

        let blend = optimize_blend(&target, &curves, &materials).unwrap();
        assert_relative_eq!(blend.total(), 100.0, epsilon = 1e-6);
        for (w, m) in blend.weights().iter().zip(&materials) {
            let lb = if m.is_fine_sand() { SAND_MIN_SHARE } else { 0.0 };
            assert!(*w >= lb - 1e-9 && *w <= 100.0 + 1e-9, "{} out of bounds: {}", m.name, w);
        }

        let active: Vec<bool> = materials.iter().map(|m| m.active).collect();
        let mixed = blend_gradation(&curves, blend.weights(), &active);
        assert_eq!(mixed.passing().len(), target.len());
    }

    #[test]
    fn test_optimizer_beats_the_equal_split() {
        let tables = StandardTables::default();
        let sieves = SieveSeries::standard();
        let target = standard_limits(&tables, 31.5, CurveType::B, sieves.sizes()).unwrap().midpoint();
        let (materials, curves) = fractions();
        let active = vec![true; 4];

        let sse = |weights: &[f64]| -> f64 {
            blend_gradation(&curves, weights, &active)
                .passing()
                .iter()
                .zip(&target)
                .map(|(b, t)| (b - t).powi(2))
                .sum()
        };
        let blend = optimize_blend(&target, &curves, &materials).unwrap();
        assert!(sse(blend.weights()) <= sse(&[25.0, 25.0, 25.0, 25.0]) + 1e-9);
    }

    #[test]
    fn test_recovers_an_exact_blend() {
        let materials = vec![
            material("Gravel", FractionKind::Coarse, true),
            material("Sand", FractionKind::Sand, true),
        ];
        let curves = vec![
            GradationCurve(vec![100.0, 40.0, 5.0, 0.0]),
            GradationCurve(vec![100.0, 100.0, 80.0, 30.0]),
        ];
        // 60/40 of the two curves.
        let target = vec![100.0, 64.0, 35.0, 12.0];
        let blend = optimize_blend(&target, &curves, &materials).unwrap();
        assert_relative_eq!(blend.weights()[0], 60.0, epsilon = 1e-6);
        assert_relative_eq!(blend.weights()[1], 40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_sand_minimum_is_binding() {
        let materials = vec![
            material("Gravel", FractionKind::Coarse, true),
            material("Sand", FractionKind::Sand, true),
        ];
        let curves = vec![
            GradationCurve(vec![100.0, 40.0, 5.0, 0.0]),
            GradationCurve(vec![100.0, 100.0, 80.0, 30.0]),
        ];
        // Target equals the pure gravel curve; sand cannot drop below 25%.
        let target = vec![100.0, 40.0, 5.0, 0.0];
        let blend = optimize_blend(&target, &curves, &materials).unwrap();
        assert_relative_eq!(blend.weights()[1], SAND_MIN_SHARE, epsilon = 1e-6);
        assert_relative_eq!(blend.weights()[0], 75.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inactive_materials_get_zero() {
        let (mut materials, curves) = fractions();
        materials[1].active = false;
        let target = vec![100.0, 100.0, 100.0, 86.0, 72.0, 57.0, 41.0, 29.0, 20.0, 14.0, 10.0, 6.0, 4.0, 1.0];
        let blend = optimize_blend(&target, &curves, &materials).unwrap();
        assert_eq!(blend.weights()[1], 0.0);
        assert_relative_eq!(blend.total(), 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_failures_are_values() {
        let (mut materials, curves) = fractions();
        let target = vec![50.0; 14];
        for m in materials.iter_mut() {
            m.active = false;
        }
        assert_eq!(optimize_blend(&target, &curves, &materials), Err(OptimizeError::NoActiveMaterials));

        let sands: Vec<MaterialSample> = (0..5)
            .map(|i| material(&format!("Sand {}", i), FractionKind::Sand, true))
            .collect();
        let sand_curves = vec![curves[2].clone(); 5];
        assert!(matches!(
            optimize_blend(&target, &sand_curves, &sands),
            Err(OptimizeError::Infeasible { .. })
        ));
    }

    #[test]
    fn test_user_proportions_validation() {
        let (materials, _) = fractions();
        assert!(BlendProportions(vec![35.0, 25.0, 20.0, 20.0]).validate(&materials).is_ok());
        assert!(BlendProportions(vec![35.0, 25.0, 20.0, 25.0]).validate(&materials).is_err());
        assert!(BlendProportions(vec![35.0, 25.0, 40.0]).validate(&materials).is_err());
    }

    fn record(cement: f64, water: f64, measured: f64) -> BatchRecord {
        BatchRecord { cement, water, measured_strength: measured, ..BatchRecord::default() }
    }

    #[test]
    fn test_best_wc_estimate() {
        let records = vec![
            record(350.0, 175.0, 40.0), // 0.50
            record(300.0, 180.0, 38.0), // 0.60
            record(250.0, 200.0, 30.0), // below target
            record(200.0, 190.0, 45.0), // 0.95, implausible
        ];
        assert_eq!(best_wc_estimate(&records, 37.0), Some(0.55));
        assert_eq!(best_wc_estimate(&records, 60.0), None);
    }

    #[test]
    fn test_suggest_cement_dosage() {
        let mut records = vec![record(360.0, 180.0, 41.0); 5]; // W/C 0.5
        let suggestion = suggest_cement_dosage(&records, 37.0, 180.0).unwrap();
        assert_eq!(suggestion.wc, 0.5);
        assert_eq!(suggestion.cement, 360.0);

        // Very low water is clamped up to the minimum dosage.
        assert_eq!(suggest_cement_dosage(&records, 37.0, 100.0).unwrap().cement, 250.0);

        records.truncate(4);
        assert!(suggest_cement_dosage(&records, 37.0, 180.0).is_none());
    }
}

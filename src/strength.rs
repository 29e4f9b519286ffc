//! Compressive strength prediction.
//!
//! Two estimates coexist: an empirical W/C law corrected by site and
//! lithology factors, and a linear regression fitted to the plant's batch
//! history. The regression is retrained from scratch whenever the caller's
//! pool changes; nothing here caches a fitted model.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Fewer valid rows than this and no model is fitted.
pub const MIN_TRAINING_ROWS: usize = 5;

const MIN_TRAINING_CEMENT: f64 = 100.0;
const MIN_TRAINING_WATER: f64 = 50.0;
const MIN_SENSITIVITY: f64 = 0.01;
const MAX_CEMENT_CHANGE: f64 = 100.0;
const MAX_WATER_CHANGE: f64 = 50.0;
/// Cementing efficiency of fly ash in the effective W/C.
const ASH_K_VALUE: f64 = 0.35;

/// One produced batch with its 28-day result.
///
/// Older exports name the measured strength `d28` or `measured_mpa` and the
/// prediction `predicted_mpa`; both spellings are accepted on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// kg/m³
    pub cement: f64,
    /// L/m³
    pub water: f64,
    /// Fly ash, kg/m³
    #[serde(default)]
    pub ash: f64,
    /// Air content, percent
    #[serde(default)]
    pub air: f64,
    /// Admixture, kg/m³
    #[serde(default)]
    pub admixture: f64,
    /// 28-day compressive strength, MPa
    #[serde(default, alias = "d28", alias = "measured_mpa")]
    pub measured_strength: f64,
    #[serde(default, alias = "predicted_mpa")]
    pub predicted_strength: Option<f64>,
}

impl BatchRecord {
    pub fn is_valid_for_training(&self) -> bool {
        self.measured_strength > 0.0
            && self.cement >= MIN_TRAINING_CEMENT
            && self.water >= MIN_TRAINING_WATER
    }

    pub fn features(&self) -> MixFeatures {
        MixFeatures {
            cement: self.cement,
            water: self.water,
            ash: self.ash,
            air: self.air,
            admixture: self.admixture,
        }
    }
}

/// Regression inputs, in model order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MixFeatures {
    pub cement: f64,
    pub water: f64,
    pub ash: f64,
    pub air: f64,
    pub admixture: f64,
}

impl MixFeatures {
    pub fn as_array(&self) -> [f64; 5] {
        [self.cement, self.water, self.ash, self.air, self.admixture]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegressionModel {
    /// Sensitivities to cement, water, ash, air and admixture.
    pub coefficients: [f64; 5],
    pub intercept: f64,
    pub r_squared: f64,
    /// Valid rows the model was fitted on.
    pub samples: usize,
}

impl RegressionModel {
    pub fn predict(&self, features: &MixFeatures) -> f64 {
        let value: f64 = features
            .as_array()
            .iter()
            .zip(self.coefficients.iter())
            .map(|(x, c)| x * c)
            .sum::<f64>()
            + self.intercept;
        value.max(0.0)
    }
}

/// Fits strength = coefficients · features + intercept by ordinary least squares.
///
/// Only records with cement ≥ 100 kg, water ≥ 50 L and a positive measured
/// strength are used. With fewer than five of them the result is `None`,
/// which callers treat as "prediction unavailable" with zero confidence.
pub fn train(records: &[BatchRecord]) -> Option<RegressionModel> {
    let rows: Vec<&BatchRecord> = records.iter().filter(|r| r.is_valid_for_training()).collect();
    if rows.len() < MIN_TRAINING_ROWS {
        tracing::debug!(valid = rows.len(), total = records.len(), "not enough rows to train");
        return None;
    }

    let n = rows.len();
    let x = DMatrix::from_fn(n, 6, |i, j| if j < 5 { rows[i].features().as_array()[j] } else { 1.0 });
    let y = DVector::from_iterator(n, rows.iter().map(|r| r.measured_strength));

    let svd = x.clone().svd(true, true);
    let solution = match svd.solve(&y, 1e-12) {
        Ok(solution) => solution,
        Err(e) => {
            tracing::warn!(error = e, "least-squares solve failed");
            return None;
        }
    };
    if solution.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let fitted = &x * &solution;
    let rss: f64 = (&y - &fitted).iter().map(|r| r * r).sum();
    let mean = y.mean();
    let tss: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    let mut coefficients = [0.0; 5];
    coefficients.copy_from_slice(&solution.as_slice()[..5]);
    tracing::debug!(samples = n, r_squared, "strength model trained");
    Some(RegressionModel { coefficients, intercept: solution[5], r_squared, samples: n })
}

/// Model prediction floored at zero; 0 without a model.
pub fn predict(model: Option<&RegressionModel>, features: &MixFeatures) -> f64 {
    model.map(|m| m.predict(features)).unwrap_or(0.0)
}

/// A dosage change that would move the prediction onto the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "component", rename_all = "snake_case")]
pub enum Suggestion {
    /// Signed change in kg/m³.
    Cement { change: f64 },
    /// Signed change in L/m³.
    Water { change: f64 },
}

impl fmt::Display for Suggestion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let (component, change, unit) = match self {
            Suggestion::Cement { change } => ("cement", *change, "kg"),
            Suggestion::Water { change } => ("water", *change, "L"),
        };
        let verb = if change > 0.0 { "increase" } else { "decrease" };
        write!(f, "{} {} by about {:.1} {}", verb, component, change.abs(), unit)
    }
}

/// Cement and water changes that close the gap between `predicted` and `target`.
///
/// Each is offered only if the model is sensitive to that component
/// (|coefficient| > 0.01) and the change stays plausible: under 100 kg of
/// cement, under 50 L of water.
pub fn suggest(target: f64, predicted: f64, model: Option<&RegressionModel>) -> Vec<Suggestion> {
    let model = match model {
        Some(m) => m,
        None => return Vec::new(),
    };
    let gap = target - predicted;
    let mut suggestions = Vec::new();

    let c_cement = model.coefficients[0];
    if c_cement.abs() > MIN_SENSITIVITY {
        let change = gap / c_cement;
        if change.abs() < MAX_CEMENT_CHANGE {
            suggestions.push(Suggestion::Cement { change });
        }
    }
    let c_water = model.coefficients[1];
    if c_water.abs() > MIN_SENSITIVITY {
        let change = gap / c_water;
        if change.abs() < MAX_WATER_CHANGE {
            suggestions.push(Suggestion::Water { change });
        }
    }
    suggestions
}

/// Water over cement plus 0.35 × fly ash; 0 when there is no binder.
pub fn effective_wc(water: f64, cement: f64, ash: f64) -> f64 {
    let binder = cement + ASH_K_VALUE * ash;
    if binder <= 0.0 {
        return 0.0;
    }
    water / binder
}

/// Empirical 28-day strength: 37 MPa at W/C 0.55, inversely proportional to
/// W/C, less 5% for every percent of air above 1.5%.
pub fn theoretical_strength(wc: f64, air: f64) -> f64 {
    if wc <= 0.0 {
        return 0.0;
    }
    let base = 37.0 * (0.55 / wc);
    let air_penalty = if air > 1.5 { (air - 1.5) * 5.0 } else { 0.0 };
    (base * (1.0 - air_penalty / 100.0)).max(0.0)
}

/// Theoretical strength corrected for the plant and the aggregate lithology.
pub fn design_strength(theoretical: f64, site_factor: f64, lithology_factor: f64) -> f64 {
    theoretical * site_factor * lithology_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(cement: f64, water: f64, ash: f64, air: f64, admixture: f64, measured: f64) -> BatchRecord {
        BatchRecord {
            cement,
            water,
            ash,
            air,
            admixture,
            measured_strength: measured,
            predicted_strength: None,
        }
    }

    fn linear_strength(c: f64, w: f64, a: f64, air: f64, adm: f64) -> f64 {
        0.12 * c - 0.15 * w + 0.05 * a - 1.2 * air + 0.8 * adm + 20.0
    }

    fn synthetic_pool() -> Vec<BatchRecord> {
        let rows = [
            (300.0, 180.0, 0.0, 1.5, 3.0),
            (320.0, 175.0, 20.0, 2.0, 3.2),
            (350.0, 170.0, 10.0, 1.2, 3.5),
            (280.0, 190.0, 40.0, 2.5, 2.8),
            (400.0, 165.0, 0.0, 1.0, 4.0),
            (360.0, 185.0, 30.0, 1.8, 2.5),
            (310.0, 160.0, 50.0, 3.0, 4.5),
            (330.0, 200.0, 15.0, 1.4, 3.9),
        ];
        rows.iter()
            .map(|&(c, w, a, air, adm)| record(c, w, a, air, adm, linear_strength(c, w, a, air, adm)))
            .collect()
    }

    #[test]
    fn test_noiseless_dataset_fits_perfectly() {
        let model = train(&synthetic_pool()).expect("model should train");
        assert_relative_eq!(model.r_squared, 1.0, epsilon = 1e-9);
        assert_relative_eq!(model.coefficients[0], 0.12, epsilon = 1e-6);
        assert_relative_eq!(model.coefficients[1], -0.15, epsilon = 1e-6);
        assert_relative_eq!(model.intercept, 20.0, epsilon = 1e-4);
        assert_eq!(model.samples, 8);

        let features = MixFeatures { cement: 340.0, water: 178.0, ash: 25.0, air: 2.0, admixture: 3.0 };
        assert_relative_eq!(
            predict(Some(&model), &features),
            linear_strength(340.0, 178.0, 25.0, 2.0, 3.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_four_valid_records_do_not_train() {
        let pool: Vec<BatchRecord> = synthetic_pool().into_iter().take(4).collect();
        assert!(train(&pool).is_none());
    }

    #[test]
    fn test_invalid_rows_are_filtered_before_counting() {
        let mut pool: Vec<BatchRecord> = synthetic_pool().into_iter().take(4).collect();
        pool.push(record(90.0, 180.0, 0.0, 1.0, 3.0, 30.0)); // too little cement
        pool.push(record(300.0, 40.0, 0.0, 1.0, 3.0, 30.0)); // too little water
        pool.push(record(300.0, 180.0, 0.0, 1.0, 3.0, 0.0)); // not yet broken
        assert!(train(&pool).is_none());
    }

    #[test]
    fn test_constant_target_has_zero_r_squared() {
        let pool: Vec<BatchRecord> = synthetic_pool()
            .into_iter()
            .map(|mut r| {
                r.measured_strength = 35.0;
                r
            })
            .collect();
        let model = train(&pool).unwrap();
        assert_eq!(model.r_squared, 0.0);
    }

    #[test]
    fn test_prediction_is_floored_and_needs_a_model() {
        let model = RegressionModel {
            coefficients: [0.0, -1.0, 0.0, 0.0, 0.0],
            intercept: 10.0,
            r_squared: 0.9,
            samples: 5,
        };
        let features = MixFeatures { water: 180.0, ..MixFeatures::default() };
        assert_eq!(predict(Some(&model), &features), 0.0);
        assert_eq!(predict(None, &features), 0.0);
    }

    #[test]
    fn test_suggestions() {
        let model = RegressionModel {
            coefficients: [0.1, -0.2, 0.0, 0.0, 0.0],
            intercept: 0.0,
            r_squared: 0.8,
            samples: 10,
        };
        // 3 MPa short: +30 kg cement or −15 L water.
        let s = suggest(40.0, 37.0, Some(&model));
        assert_eq!(s.len(), 2);
        match s[0] {
            Suggestion::Cement { change } => assert_relative_eq!(change, 30.0, epsilon = 1e-9),
            _ => panic!("expected cement first"),
        }
        match s[1] {
            Suggestion::Water { change } => assert_relative_eq!(change, -15.0, epsilon = 1e-9),
            _ => panic!("expected water second"),
        }
        assert_eq!(s[0].to_string(), "increase cement by about 30.0 kg");
        assert_eq!(s[1].to_string(), "decrease water by about 15.0 L");

        // 15 MPa short: 150 kg cement is implausible, −75 L water too.
        assert!(suggest(52.0, 37.0, Some(&model)).is_empty());
        assert!(suggest(40.0, 37.0, None).is_empty());

        let insensitive = RegressionModel { coefficients: [0.005, 0.0, 0.0, 0.0, 0.0], ..model };
        assert!(suggest(40.0, 37.0, Some(&insensitive)).is_empty());
    }

    #[test]
    fn test_effective_wc_and_theoretical_strength() {
        assert_relative_eq!(effective_wc(175.0, 300.0, 100.0), 175.0 / 335.0, epsilon = 1e-12);
        assert_eq!(effective_wc(175.0, 0.0, 0.0), 0.0);

        assert_relative_eq!(theoretical_strength(0.55, 1.0), 37.0, epsilon = 1e-12);
        // 2.5% air: 5% penalty.
        assert_relative_eq!(theoretical_strength(0.55, 2.5), 37.0 * 0.95, epsilon = 1e-12);
        assert_eq!(theoretical_strength(0.0, 1.0), 0.0);
        assert_eq!(theoretical_strength(0.5, 30.0), 0.0);

        assert_relative_eq!(design_strength(37.0, 1.1, 1.07), 37.0 * 1.1 * 1.07, epsilon = 1e-12);
    }
}

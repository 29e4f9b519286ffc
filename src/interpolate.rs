//! Standard envelope lookup on a logarithmic sieve-size axis.
//!
//! Grading envelopes are tabulated at a handful of sieve sizes. Queries at
//! other apertures interpolate linearly in `ln(size)`, which is how grading
//! charts are drawn.

use serde::Serialize;

use crate::error::MixError;
use crate::standards::{CurveType, EnvelopePoint, GradingEnvelope, StandardTables, SIZE_TOLERANCE};

/// Lower and upper passing limits aligned with a sieve series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Limits {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Limits {
    /// Midpoint of the envelope at every sieve.
    pub fn midpoint(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, up)| (lo + up) / 2.0)
            .collect()
    }
}

// Log-linear interpolation between (x1, y1) and (x2, y2) evaluated at x.
fn log_interpolate(x: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    let ratio = (x.ln() - x1.ln()) / (x2.ln() - x1.ln());
    y1 + ratio * (y2 - y1)
}

/// Limits of a single envelope at one aperture.
///
/// * exact tabulated size: the tabulated pair.
/// * above the largest tabulated size: (100, 100).
/// * below the smallest tabulated size: the smallest tabulated pair.
/// * otherwise: log-size interpolation between the smallest tabulated size
///   above `size` and the largest one at or below it. A zero-size bracket
///   cannot be placed on a log axis, so the upper neighbour's pair is used.
pub fn envelope_at(envelope: &GradingEnvelope, size: f64) -> (f64, f64) {
    if let Some(p) = envelope
        .points
        .iter()
        .find(|p| (p.size - size).abs() < SIZE_TOLERANCE)
    {
        return (p.lower, p.upper);
    }

    // Points are ordered largest first.
    let above: Option<&EnvelopePoint> = envelope.points.iter().filter(|p| p.size > size).last();
    let below: Option<&EnvelopePoint> = envelope.points.iter().find(|p| p.size <= size);

    match (above, below) {
        (None, _) => (100.0, 100.0),
        (Some(s1), None) => (s1.lower, s1.upper),
        (Some(s1), Some(s2)) => {
            if s2.size <= 0.0 || size <= 0.0 || (s2.size.ln() - s1.size.ln()).abs() < f64::EPSILON {
                return (s1.lower, s1.upper);
            }
            (
                log_interpolate(size, s1.size, s1.lower, s2.size, s2.lower),
                log_interpolate(size, s1.size, s1.upper, s2.size, s2.upper),
            )
        }
    }
}

/// Standard lower/upper passing limits for `dmax` and `curve` at every sieve of `sieves`.
pub fn standard_limits(
    tables: &StandardTables,
    dmax: f64,
    curve: CurveType,
    sieves: &[f64],
) -> Result<Limits, MixError> {
    let envelope = tables.envelope(dmax, curve)?;
    let (lower, upper) = sieves.iter().map(|&e| envelope_at(envelope, e)).unzip();
    Ok(Limits { lower, upper })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::SieveSeries;
    use approx::assert_relative_eq;

    #[test]
    fn test_exact_key_match_is_not_interpolated() {
        let tables = StandardTables::default();
        let limits = standard_limits(&tables, 31.5, CurveType::B, &[16.0]).unwrap();
        assert_eq!(limits.lower, vec![92.0]);
        assert_eq!(limits.upper, vec![92.0]);
    }

    #[test]
    fn test_above_largest_size_is_fully_passing() {
        let tables = StandardTables::default();
        let limits = standard_limits(&tables, 31.5, CurveType::A, &[45.0, 63.0]).unwrap();
        assert_eq!(limits.lower, vec![100.0, 100.0]);
        assert_eq!(limits.upper, vec![100.0, 100.0]);
        let limits = standard_limits(&tables, 16.0, CurveType::B, &[22.4]).unwrap();
        assert_eq!(limits.lower, vec![100.0]);
    }

    #[test]
    fn test_log_size_interpolation() {
        let tables = StandardTables::default();
        // 0.125 lies between the tabulated 0.15 (7%) and 0.063 (3%) on curve B.
        let limits = standard_limits(&tables, 31.5, CurveType::B, &[0.125]).unwrap();
        let ratio = (0.125f64.ln() - 0.15f64.ln()) / (0.063f64.ln() - 0.15f64.ln());
        let expected = 7.0 + ratio * (3.0 - 7.0);
        assert_relative_eq!(limits.lower[0], expected, epsilon = 1e-12);
        assert_relative_eq!(limits.upper[0], expected, epsilon = 1e-12);

        // 16 mm envelope: 11.2 between 16 (100/100) and 8 (70/85).
        let limits = standard_limits(&tables, 16.0, CurveType::B, &[11.2]).unwrap();
        let ratio = (11.2f64.ln() - 16.0f64.ln()) / (8.0f64.ln() - 16.0f64.ln());
        assert_relative_eq!(limits.lower[0], 100.0 + ratio * (70.0 - 100.0), epsilon = 1e-12);
        assert_relative_eq!(limits.upper[0], 100.0 + ratio * (85.0 - 100.0), epsilon = 1e-12);
    }

    #[test]
    fn test_below_smallest_positive_size_keeps_neighbour() {
        let tables = StandardTables::default();
        // 16 mm curve B: below 0.25 the next tabulated size is 0.0.
        let limits = standard_limits(&tables, 16.0, CurveType::B, &[0.125, 0.063]).unwrap();
        assert_eq!(limits.lower, vec![8.0, 8.0]);
        assert_eq!(limits.upper, vec![15.0, 15.0]);
    }

    #[test]
    fn test_limits_are_monotonic_for_every_table() {
        let tables = StandardTables::default();
        let sieves = SieveSeries::standard();
        for env in &tables.grading {
            let limits = standard_limits(&tables, env.dmax, env.curve, sieves.sizes()).unwrap();
            for i in 1..limits.lower.len() {
                assert!(limits.lower[i] <= limits.lower[i - 1] + 1e-12);
                assert!(limits.upper[i] <= limits.upper[i - 1] + 1e-12);
                assert!(limits.lower[i] <= limits.upper[i] + 1e-12);
            }
            assert_eq!(limits.lower[0], 100.0);
        }
    }

    #[test]
    fn test_unknown_envelope_is_an_error() {
        let tables = StandardTables::default();
        assert!(standard_limits(&tables, 8.0, CurveType::B, &[4.0]).is_err());
    }

    #[test]
    fn test_midpoint() {
        let limits = Limits { lower: vec![100.0, 70.0], upper: vec![100.0, 85.0] };
        assert_eq!(limits.midpoint(), vec![100.0, 77.5]);
    }
}

//! Quality-control analytics over broken cube results.

use serde::{Deserialize, Serialize};

use crate::strength::BatchRecord;

const SHORTFALL_THRESHOLD: f64 = -3.0;
const SURPLUS_THRESHOLD: f64 = 3.0;
const CRITICAL_WC: f64 = 0.55;
const HIGH_AIR: f64 = 2.0;
const HIGH_FINES: f64 = 45.0;

const ALERT_WINDOW: usize = 5;
const ALERT_MIN_RESULTS: usize = 3;
const DROP_SLOPE: f64 = -3.0;
const ECONOMY_MARGIN: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curing {
    #[default]
    Normal,
    Poor,
}

/// Likely cause of a result that differs from expectation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    HighWaterCement,
    HighAir,
    ExcessFines,
    PoorCuring,
    Undetermined,
    OverDesigned,
}

impl Cause {
    pub fn explanation(&self) -> &'static str {
        match self {
            Cause::HighWaterCement => {
                "W/C above the critical level; excess water leaves capillary porosity that lowers strength"
            }
            Cause::HighAir => "high entrained or entrapped air; each extra 1% costs about 5% of strength",
            Cause::ExcessFines => "sand share too high; larger aggregate surface leaves too little paste",
            Cause::PoorCuring => "inadequate curing stops hydration early and causes surface cracking",
            Cause::Undetermined => {
                "no mix-related cause found; check aggregate contamination, cement quality and sampling"
            }
            Cause::OverDesigned => "strength above expectation; cement content can be reduced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    /// measured − expected, MPa
    pub difference: f64,
    pub causes: Vec<Cause>,
}

/// Explains a QC result: causes are listed only when the result is more than
/// 3 MPa off the expectation.
pub fn diagnose_shortfall(
    expected: f64,
    measured: f64,
    wc: f64,
    air: f64,
    fines_share: f64,
    curing: Curing,
) -> Diagnosis {
    let difference = measured - expected;
    let mut causes = Vec::new();
    if difference < SHORTFALL_THRESHOLD {
        if wc > CRITICAL_WC {
            causes.push(Cause::HighWaterCement);
        }
        if air > HIGH_AIR {
            causes.push(Cause::HighAir);
        }
        if fines_share > HIGH_FINES {
            causes.push(Cause::ExcessFines);
        }
        if curing != Curing::Normal {
            causes.push(Cause::PoorCuring);
        }
        if causes.is_empty() {
            causes.push(Cause::Undetermined);
        }
    } else if difference > SURPLUS_THRESHOLD {
        causes.push(Cause::OverDesigned);
    }
    Diagnosis { difference, causes }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Strength fell across the last pours; reduce the sand share by about 2%.
    StrengthDrop { drop: f64 },
    /// Results run well above target; cement can drop by about 3%.
    EconomyOpportunity { surplus: f64 },
}

/// Trend alerts over the last five pours of a project.
///
/// Needs at least five records and three positive results among the last
/// five. A drop of more than 3 MPa from first to last wins over the economy
/// check.
pub fn trend_alerts(history: &[BatchRecord], target_strength: f64) -> Vec<Alert> {
    if history.len() < ALERT_WINDOW {
        return Vec::new();
    }
    let recent: Vec<f64> = history[history.len() - ALERT_WINDOW..]
        .iter()
        .map(|r| r.measured_strength)
        .filter(|m| *m > 0.0)
        .collect();
    if recent.len() < ALERT_MIN_RESULTS {
        return Vec::new();
    }

    let mean = recent.iter().sum::<f64>() / recent.len() as f64;
    let slope = recent[recent.len() - 1] - recent[0];
    if slope < DROP_SLOPE {
        vec![Alert::StrengthDrop { drop: -slope }]
    } else if mean > target_strength + ECONOMY_MARGIN {
        vec![Alert::EconomyOpportunity { surplus: mean - target_strength }]
    } else {
        Vec::new()
    }
}

//! Multi-criterion compliance check of a finalized design.
//!
//! Rules run in a fixed order over an immutable snapshot of the design. Each
//! rule that fires contributes one finding; the order of findings, and of the
//! rationales derived from them, is part of the output contract.

use serde::{Deserialize, Serialize};

use crate::standards::ComplianceLimits;

const CLASS_WC_ALLOWANCE: f64 = 0.02;
const STRENGTH_ALLOWANCE: f64 = 2.0;
const MAX_GRADING_DEVIATION: f64 = 5.0;
const MAX_ABRASION_LOSS: f64 = 35.0;
const MAX_METHYLENE_BLUE: f64 = 1.5;

/// Everything the rules look at besides the resolved class limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceInput {
    pub asr_status: String,
    /// MPa
    pub predicted_strength: f64,
    pub wc: f64,
    /// kg/m³
    pub cement: f64,
    /// Total envelope deviation, percentage points.
    pub grading_deviation: f64,
    /// Proportion-weighted Los Angeles loss, percent.
    pub weighted_la: f64,
    /// Proportion-weighted methylene blue value.
    pub weighted_mb: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    ExposureWc,
    ExposureCement,
    AsrRisk,
    ClassWc,
    StrengthShortfall,
    Gradation,
    Abrasion,
    Cleanliness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Violation,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub rule: RuleKind,
    pub severity: Severity,
    pub message: String,
    pub rationale: String,
}

type Check = fn(&ComplianceInput, &ComplianceLimits) -> Option<(String, String)>;

struct Rule {
    kind: RuleKind,
    severity: Severity,
    check: Check,
}

const RULES: [Rule; 8] = [
    Rule { kind: RuleKind::ExposureWc, severity: Severity::Violation, check: exposure_wc },
    Rule { kind: RuleKind::ExposureCement, severity: Severity::Violation, check: exposure_cement },
    Rule { kind: RuleKind::AsrRisk, severity: Severity::Warning, check: asr_risk },
    Rule { kind: RuleKind::ClassWc, severity: Severity::Violation, check: class_wc },
    Rule { kind: RuleKind::StrengthShortfall, severity: Severity::Violation, check: strength_shortfall },
    Rule { kind: RuleKind::Gradation, severity: Severity::Violation, check: gradation },
    Rule { kind: RuleKind::Abrasion, severity: Severity::Violation, check: abrasion },
    Rule { kind: RuleKind::Cleanliness, severity: Severity::Violation, check: cleanliness },
];

fn exposure_wc(input: &ComplianceInput, limits: &ComplianceLimits) -> Option<(String, String)> {
    let max = limits.exposure.max_wc;
    (input.wc > max).then(|| {
        (
            format!(
                "durability ({}): W/C {:.2} > {:.2} max [TS EN 206]",
                limits.exposure_class, input.wc, max
            ),
            format!(
                "The maximum W/C for exposure class {} is exceeded, shortening service life \
                 under freeze-thaw and corrosion.",
                limits.exposure_class
            ),
        )
    })
}

fn exposure_cement(input: &ComplianceInput, limits: &ComplianceLimits) -> Option<(String, String)> {
    let min = limits.exposure.min_cement;
    (input.cement < min).then(|| {
        (
            format!(
                "durability ({}): cement {:.0} kg < {:.0} kg min [KTS 2013]",
                limits.exposure_class, input.cement, min
            ),
            format!(
                "Minimum cement content for exposure class {} is not met; aggregates may not be \
                 fully coated.",
                limits.exposure_class
            ),
        )
    })
}

/// Case-sensitive substring test on the ASR label.
pub fn is_reactive(asr_status: &str) -> bool {
    asr_status.contains("reactive")
}

fn asr_risk(input: &ComplianceInput, _: &ComplianceLimits) -> Option<(String, String)> {
    is_reactive(&input.asr_status).then(|| {
        (
            format!("ASR risk: aggregate flagged as '{}' [KTS section 414]", input.asr_status),
            "Alkali-silica reaction risk requires low-alkali cement or a mineral addition \
             (fly ash, silica fume)."
                .to_string(),
        )
    })
}

fn class_wc(input: &ComplianceInput, limits: &ComplianceLimits) -> Option<(String, String)> {
    let max = limits.class.max_wc;
    (input.wc > max + CLASS_WC_ALLOWANCE).then(|| {
        (
            format!(
                "strength class ({}): W/C {:.2} > {:.2} [TS EN 206]",
                limits.target_class, input.wc, max
            ),
            format!("W/C is above the limit of class {} beyond the 0.02 allowance.", limits.target_class),
        )
    })
}

fn strength_shortfall(input: &ComplianceInput, limits: &ComplianceLimits) -> Option<(String, String)> {
    let target = limits.class.min_strength;
    (input.predicted_strength < target - STRENGTH_ALLOWANCE).then(|| {
        (
            format!(
                "strength shortfall: predicted {:.1} MPa < target {:.1} MPa",
                input.predicted_strength, target
            ),
            format!(
                "Predicted strength misses the {} target by more than 2 MPa.",
                limits.target_class
            ),
        )
    })
}

fn gradation(input: &ComplianceInput, _: &ComplianceLimits) -> Option<(String, String)> {
    (input.grading_deviation > MAX_GRADING_DEVIATION).then(|| {
        (
            format!("TS 802 gradation: deviation {:.1}", input.grading_deviation),
            "The blended grading lies outside the TS 802 envelope; workability and paste demand \
             will differ from the design."
                .to_string(),
        )
    })
}

fn abrasion(input: &ComplianceInput, _: &ComplianceLimits) -> Option<(String, String)> {
    (input.weighted_la > MAX_ABRASION_LOSS).then(|| {
        (
            format!("abrasion: LA {:.1} > {:.0}", input.weighted_la, MAX_ABRASION_LOSS),
            "Los Angeles loss above 35% indicates aggregate too weak for structural concrete."
                .to_string(),
        )
    })
}

fn cleanliness(input: &ComplianceInput, _: &ComplianceLimits) -> Option<(String, String)> {
    (input.weighted_mb > MAX_METHYLENE_BLUE).then(|| {
        (
            format!("cleanliness: MB {:.2} > {:.1} (clay present)", input.weighted_mb, MAX_METHYLENE_BLUE),
            "Methylene blue above 1.5 indicates clay fines that raise water demand and weaken bond."
                .to_string(),
        )
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Red,
    Yellow,
    Green,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceVerdict {
    pub status: Status,
    pub title: String,
    pub summary: String,
    pub violations: Vec<Finding>,
    pub warnings: Vec<Finding>,
    /// Rationales of all findings, in rule order.
    pub rationales: Vec<String>,
}

/// Runs every rule in order. Non-compliant designs are reported, never rejected.
pub fn evaluate(input: &ComplianceInput, limits: &ComplianceLimits) -> ComplianceVerdict {
    let findings: Vec<Finding> = RULES
        .iter()
        .filter_map(|rule| {
            (rule.check)(input, limits).map(|(message, rationale)| Finding {
                rule: rule.kind,
                severity: rule.severity,
                message,
                rationale,
            })
        })
        .collect();

    let rationales = findings.iter().map(|f| f.rationale.clone()).collect();
    let (violations, warnings): (Vec<Finding>, Vec<Finding>) =
        findings.into_iter().partition(|f| f.severity == Severity::Violation);

    let (status, title, summary) = if !violations.is_empty() {
        (Status::Red, "NOT COMPLIANT", "Durability or standard limits are exceeded.")
    } else if !warnings.is_empty() {
        (Status::Yellow, "CONDITIONAL ACCEPTANCE", "ASR or performance risks are present.")
    } else {
        (Status::Green, "COMPLIANT", "All TS EN 206 and KTS limits are met.")
    };

    ComplianceVerdict {
        status,
        title: title.to_string(),
        summary: summary.to_string(),
        violations,
        warnings,
        rationales,
    }
}

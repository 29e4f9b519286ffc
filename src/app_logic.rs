//! End-to-end design session: from the YAML session file to a `DesignReport`.
use anyhow::Context;
use rayon::prelude::*;
use serde::Serialize;

use crate::calibration::{classify_plant, reactive_update, trend_evolve, PlantClass};
use crate::compliance::{evaluate, ComplianceInput, ComplianceVerdict};
use crate::config::{load_config, DesignConfig};
use crate::gradation::{blend_gradation, grading_deviation, material_curve, GradationCurve, GradingDeviation};
use crate::interpolate::{standard_limits, Limits};
use crate::material::{weighted_property, MaterialSample};
use crate::optimizer::{optimize_blend, suggest_cement_dosage, BlendProportions, CementSuggestion};
use crate::parser::read_batch_records;
use crate::qc::{diagnose_shortfall, trend_alerts, Alert, Curing, Diagnosis};
use crate::recipe::{batch_recipe, Dosage, Recipe};
use crate::standards::{ComplianceLimits, StandardTables, DEFAULT_ASR_STATUS};
use crate::strength::{
    design_strength, effective_wc, suggest, theoretical_strength, train, BatchRecord, MixFeatures,
    RegressionModel, Suggestion,
};

pub const CHOSEN_BLEND: &str = "chosen";

#[derive(Debug, Serialize)]
pub struct DesignReport {
    pub project: String,
    pub plant: Option<String>,
    pub sieves: Vec<f64>,
    pub limits: Limits,
    /// Envelope midpoint the optimizer aims for.
    pub target: Vec<f64>,
    /// Set when the optimizer failed and the chosen blend is an equal split.
    pub optimizer_message: Option<String>,
    /// The chosen blend first, then the configured trials.
    pub blends: Vec<BlendEvaluation>,
    pub strength: StrengthReport,
    pub calibration: CalibrationReport,
    pub cement_suggestion: Option<CementSuggestion>,
    pub recipe: Recipe,
    pub latest_diagnosis: Option<Diagnosis>,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Serialize)]
pub struct BlendEvaluation {
    pub name: String,
    pub proportions: Vec<f64>,
    pub passing: Vec<f64>,
    pub deviation: GradingDeviation,
    pub weighted_la: f64,
    pub weighted_mb: f64,
    pub weighted_absorption: f64,
    pub verdict: ComplianceVerdict,
}

#[derive(Debug, Serialize)]
pub struct StrengthReport {
    pub effective_wc: f64,
    pub theoretical: f64,
    pub lithology_factor: f64,
    /// Theoretical × evolved site factor × lithology factor; the strength compliance is scored on.
    pub design: f64,
    pub model: Option<RegressionModel>,
    /// Pool-wide regression estimate, shown next to the design strength.
    pub regression: Option<f64>,
    /// Minimum cube strength of the target class.
    pub target: f64,
    pub suggestions: Vec<String>,
    pub adjustments: Vec<Suggestion>,
}

#[derive(Debug, Serialize)]
pub struct CalibrationReport {
    pub configured_site_factor: f64,
    /// Periodic recalibration over the pool; feeds the design strength.
    pub evolved_site_factor: f64,
    /// Per-sample updates replayed over the pool in order.
    pub reactive_site_factor: f64,
    pub plant_class: PlantClass,
    pub plant_class_label: String,
}

/// Loads the session, its batch pool and standard tables, and runs the design.
///
/// `records` and `tables` override the paths given in the session file.
pub fn run(config_path: &str, records: Option<&str>, tables: Option<&str>) -> anyhow::Result<DesignReport> {
    tracing::info!(config = config_path, "running design session");
    let conf = load_config(config_path).with_context(|| format!("failed to load {}", config_path))?;
    conf.validate().context("invalid design session")?;

    let tables = match tables.or(conf.sources.tables.as_deref()) {
        Some(path) => {
            let tables = StandardTables::load(path).with_context(|| format!("failed to load tables {}", path))?;
            tables.validate().context("invalid standard tables")?;
            tables
        }
        None => StandardTables::default(),
    };
    let pool = match records.or(conf.sources.records.as_deref()) {
        Some(path) => read_batch_records(path).with_context(|| format!("failed to read batch pool {}", path))?,
        None => Vec::new(),
    };

    design(&conf, &tables, &pool)
}

/// Runs a validated session against the given tables and batch pool.
pub fn design(conf: &DesignConfig, tables: &StandardTables, pool: &[BatchRecord]) -> anyhow::Result<DesignReport> {
    let sieves = conf.sieves.sizes();
    let materials = &conf.materials;
    let curves: Vec<GradationCurve> = materials.iter().map(|m| material_curve(m, sieves.len())).collect();

    let limits = standard_limits(tables, conf.design.dmax, conf.design.curve, sieves)?;
    let target = limits.midpoint();

    let (chosen, optimizer_message) = match &conf.mix.proportions {
        Some(p) => (BlendProportions(p.clone()), None),
        None => match optimize_blend(&target, &curves, materials) {
            Ok(p) => (p, None),
            Err(e) => {
                tracing::warn!(error = %e, "blend optimization failed, using equal split");
                (equal_split(materials), Some(format!("{}; change the active materials", e)))
            }
        },
    };
    tracing::info!(proportions = ?chosen.weights(), "blend selected");

    let mix = &conf.mix;
    let wc = effective_wc(mix.water, mix.cement, mix.ash);
    let theoretical = theoretical_strength(wc, mix.air);
    let lithology = conf.design.lithology.as_deref().unwrap_or_default();
    let lithology_factor = tables.lithology_factor(lithology);
    let asr_status = conf
        .design
        .asr_status
        .clone()
        .or_else(|| tables.asr_risk(lithology).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ASR_STATUS.to_string());

    let configured = conf.design.site_factor;
    let evolved = trend_evolve(pool, configured);
    let reactive = pool.iter().fold(configured, |factor, r| match r.predicted_strength {
        Some(p) => reactive_update(p, r.measured_strength, factor),
        None => factor,
    });
    let plant_class = classify_plant(pool);
    let design_value = design_strength(theoretical, evolved, lithology_factor);

    let model = train(pool);
    let features = MixFeatures {
        cement: mix.cement,
        water: mix.water,
        ash: mix.ash,
        air: mix.air,
        admixture: mix.admixture_mass(),
    };
    let regression = model.as_ref().map(|m| m.predict(&features));

    let compliance = tables.compliance_limits(&conf.design.target_class, &conf.design.exposure_class)?;
    let min_strength = compliance.class.min_strength;
    let adjustments = match regression {
        Some(predicted) => suggest(min_strength, predicted, model.as_ref()),
        None => Vec::new(),
    };
    let cement_suggestion = suggest_cement_dosage(pool, min_strength, mix.water);

    let mut candidates = vec![(CHOSEN_BLEND.to_string(), chosen.0.clone())];
    candidates.extend(conf.trials.iter().map(|t| (t.name.clone(), t.proportions.clone())));
    let base = ComplianceInput {
        asr_status,
        predicted_strength: design_value,
        wc,
        cement: mix.cement,
        grading_deviation: 0.0,
        weighted_la: 0.0,
        weighted_mb: 0.0,
    };
    let blends: Vec<BlendEvaluation> = candidates
        .into_par_iter()
        .map(|(name, proportions)| {
            evaluate_blend(name, proportions, materials, &curves, &limits, sieves, &base, &compliance)
        })
        .collect();
    for blend in blends.iter() {
        tracing::info!(blend = %blend.name, status = ?blend.verdict.status, deviation = blend.deviation.total, "blend evaluated");
    }

    let dosage = Dosage {
        cement: mix.cement,
        water: mix.water,
        ash: mix.ash,
        air: mix.air,
        admixture_percent: mix.admixture_percent,
    };
    let recipe = batch_recipe(&dosage, materials, chosen.weights());
    if recipe.aggregate_volume <= 0.0 {
        tracing::warn!(volume = recipe.aggregate_volume, "paste volume leaves no room for aggregate");
    }

    let fines_share: f64 = materials
        .iter()
        .zip(chosen.weights())
        .filter(|(m, _)| m.active && m.is_fine_sand())
        .map(|(_, w)| w)
        .sum();
    let latest_diagnosis = pool.iter().rev().find_map(|r| match r.predicted_strength {
        Some(p) if r.measured_strength > 0.0 => Some(diagnose_shortfall(
            p,
            r.measured_strength,
            effective_wc(r.water, r.cement, r.ash),
            r.air,
            fines_share,
            Curing::Normal,
        )),
        _ => None,
    });
    let alerts = trend_alerts(pool, min_strength);

    Ok(DesignReport {
        project: conf.project.name.clone(),
        plant: conf.project.plant.clone(),
        sieves: sieves.to_vec(),
        limits,
        target,
        optimizer_message,
        blends,
        strength: StrengthReport {
            effective_wc: wc,
            theoretical,
            lithology_factor,
            design: design_value,
            model,
            regression,
            target: min_strength,
            suggestions: adjustments.iter().map(|s| s.to_string()).collect(),
            adjustments,
        },
        calibration: CalibrationReport {
            configured_site_factor: configured,
            evolved_site_factor: evolved,
            reactive_site_factor: reactive,
            plant_class_label: plant_class.label().to_string(),
            plant_class,
        },
        cement_suggestion,
        recipe,
        latest_diagnosis,
        alerts,
    })
}

fn equal_split(materials: &[MaterialSample]) -> BlendProportions {
    let active = materials.iter().filter(|m| m.active).count();
    BlendProportions(
        materials
            .iter()
            .map(|m| if m.active && active > 0 { 100.0 / active as f64 } else { 0.0 })
            .collect(),
    )
}

#[allow(clippy::too_many_arguments)]
fn evaluate_blend(
    name: String,
    proportions: Vec<f64>,
    materials: &[MaterialSample],
    curves: &[GradationCurve],
    limits: &Limits,
    sieves: &[f64],
    base: &ComplianceInput,
    compliance: &ComplianceLimits,
) -> BlendEvaluation {
    let active: Vec<bool> = materials.iter().map(|m| m.active).collect();
    let blend = blend_gradation(curves, &proportions, &active);
    let deviation = grading_deviation(&blend, limits, sieves);
    let weighted_la = weighted_property(materials, &proportions, |m| m.abrasion_loss);
    let weighted_mb = weighted_property(materials, &proportions, |m| m.methylene_blue);
    let weighted_absorption = weighted_property(materials, &proportions, |m| m.water_absorption);

    let input = ComplianceInput {
        grading_deviation: deviation.total,
        weighted_la,
        weighted_mb,
        ..base.clone()
    };
    let verdict = evaluate(&input, compliance);

    BlendEvaluation {
        name,
        proportions,
        passing: blend.0,
        deviation,
        weighted_la,
        weighted_mb,
        weighted_absorption,
        verdict,
    }
}

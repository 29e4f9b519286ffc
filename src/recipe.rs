//! Batch quantities for one cubic metre by absolute volume.

use serde::Serialize;

use crate::material::{weighted_property, MaterialSample};

const CEMENT_DENSITY: f64 = 3.15;
const WATER_DENSITY: f64 = 1.0;
const ASH_DENSITY: f64 = 2.25;
const ADMIXTURE_DENSITY: f64 = 1.12;
const LITRES_PER_M3: f64 = 1000.0;

/// Binder-side dosages of a design.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dosage {
    /// kg/m³
    pub cement: f64,
    /// L/m³
    pub water: f64,
    /// kg/m³
    pub ash: f64,
    /// percent
    pub air: f64,
    /// percent of cement mass
    pub admixture_percent: f64,
}

impl Dosage {
    /// Admixture in kg/m³.
    pub fn admixture_mass(&self) -> f64 {
        self.cement * self.admixture_percent / 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateMass {
    pub name: String,
    /// kg/m³, SSD
    pub mass: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub cement: f64,
    pub water: f64,
    pub ash: f64,
    pub admixture: f64,
    pub air: f64,
    /// Litres left for aggregate.
    pub aggregate_volume: f64,
    pub aggregates: Vec<AggregateMass>,
    /// Proportion-weighted water absorption, percent.
    pub weighted_absorption: f64,
    /// Water the aggregates take up, litres.
    pub absorption_water: f64,
}

/// Splits the volume left by paste and air between the active fractions.
///
/// A paste volume above one cubic metre leaves a negative aggregate volume;
/// the recipe reports it as is so the caller can flag the design.
pub fn batch_recipe(dosage: &Dosage, materials: &[MaterialSample], proportions: &[f64]) -> Recipe {
    let admixture = dosage.admixture_mass();
    let paste = dosage.cement / CEMENT_DENSITY
        + dosage.water / WATER_DENSITY
        + dosage.ash / ASH_DENSITY
        + dosage.air * 10.0
        + admixture / ADMIXTURE_DENSITY;
    let aggregate_volume = LITRES_PER_M3 - paste;

    let aggregates: Vec<AggregateMass> = materials
        .iter()
        .zip(proportions.iter())
        .filter(|(m, _)| m.active)
        .map(|(m, p)| AggregateMass {
            name: m.name.clone(),
            mass: aggregate_volume * p / 100.0 * m.density,
        })
        .collect();

    let total_aggregate: f64 = aggregates.iter().map(|a| a.mass).sum();
    let weighted_absorption = weighted_property(materials, proportions, |m| m.water_absorption);

    Recipe {
        cement: dosage.cement,
        water: dosage.water,
        ash: dosage.ash,
        admixture,
        air: dosage.air,
        aggregate_volume,
        aggregates,
        weighted_absorption,
        absorption_water: weighted_absorption / 100.0 * total_aggregate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::FractionKind;
    use approx::assert_relative_eq;

    fn fraction(name: &str, density: f64, absorption: f64) -> MaterialSample {
        MaterialSample {
            name: name.into(),
            kind: FractionKind::Coarse,
            reference_mass: 1000.0,
            retained: vec![],
            density,
            water_absorption: absorption,
            abrasion_loss: 25.0,
            methylene_blue: 0.5,
            active: true,
        }
    }

    #[test]
    fn test_batch_recipe() {
        let dosage = Dosage { cement: 315.0, water: 180.0, ash: 0.0, air: 1.0, admixture_percent: 1.0 };
        let materials = vec![fraction("Gravel", 2.70, 1.0), fraction("Sand", 2.60, 2.0)];
        let recipe = batch_recipe(&dosage, &materials, &[60.0, 40.0]);

        let paste = 100.0 + 180.0 + 10.0 + 3.15 / 1.12;
        assert_relative_eq!(recipe.aggregate_volume, 1000.0 - paste, epsilon = 1e-9);
        assert_relative_eq!(recipe.admixture, 3.15, epsilon = 1e-12);
        assert_relative_eq!(recipe.aggregates[0].mass, (1000.0 - paste) * 0.6 * 2.70, epsilon = 1e-9);
        assert_relative_eq!(recipe.weighted_absorption, 1.4, epsilon = 1e-12);

        let total: f64 = recipe.aggregates.iter().map(|a| a.mass).sum();
        assert_relative_eq!(recipe.absorption_water, 0.014 * total, epsilon = 1e-9);
    }

    #[test]
    fn test_inactive_fraction_is_left_out() {
        let dosage = Dosage { cement: 300.0, water: 180.0, ash: 50.0, air: 2.0, admixture_percent: 0.0 };
        let mut materials = vec![fraction("Gravel", 2.70, 1.0), fraction("Sand", 2.60, 2.0)];
        materials[1].active = false;
        let recipe = batch_recipe(&dosage, &materials, &[100.0, 0.0]);
        assert_eq!(recipe.aggregates.len(), 1);
        assert_eq!(recipe.aggregates[0].name, "Gravel");
    }
}

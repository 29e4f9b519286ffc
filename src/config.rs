//! Design-session configuration: the YAML file a lab engineer fills in for one mix.

use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{MixError, ValidationError};
use crate::material::{MaterialSample, SieveSeries};
use crate::optimizer::BlendProportions;
use crate::standards::CurveType;

const CONCRETE_CLASS_PATTERN: &str = r"^C\d{2}/\d{2}\+?$";
const EXPOSURE_CLASS_PATTERN: &str = r"^X(0|[CDSFA]\d)$";

/// Represents a complete mix-design session.
#[derive(Debug, Deserialize)]
pub struct DesignConfig {
    pub project: Project,
    pub design: Design,
    #[serde(default = "SieveSeries::standard")]
    pub sieves: SieveSeries,
    pub materials: Vec<MaterialSample>,
    pub mix: Mix,
    /// Alternative proportion sets evaluated next to the chosen blend.
    #[serde(default)]
    pub trials: Vec<Trial>,
    #[serde(default)]
    pub sources: Sources,
}

impl DesignConfig {
    /// Validates the entire configuration.
    ///
    /// Retained-mass arrays of the wrong length are repaired later, not
    /// rejected; every explicit proportion set must match the material list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.project.validate()?;
        self.design.validate()?;
        self.sieves.validate()?;
        if self.materials.is_empty() {
            return Err(ValidationError::new("at least one material is required"));
        }
        for material in self.materials.iter() {
            material.validate()?;
            if material.retained.len() != self.sieves.len() {
                tracing::warn!(
                    material = %material.name,
                    retained = material.retained.len(),
                    sieves = self.sieves.len(),
                    "retained masses will be padded or truncated to the sieve series"
                );
            }
        }
        self.mix.validate()?;
        if let Some(proportions) = &self.mix.proportions {
            BlendProportions(proportions.clone()).validate(&self.materials)?;
        }
        for trial in self.trials.iter() {
            trial.validate(&self.materials)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub plant: Option<String>,
}

impl Project {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("project name must not be empty"));
        }
        Ok(())
    }
}

/// Targets and environment of the design.
#[derive(Debug, Deserialize)]
pub struct Design {
    /// Strength class such as `C30/37`.
    pub target_class: String,
    /// Exposure class such as `XC3`.
    pub exposure_class: String,
    /// Aggregate lithology; selects the strength factor and the default ASR status.
    #[serde(default)]
    pub lithology: Option<String>,
    /// Explicit ASR status; overrides the lithology's risk label.
    #[serde(default)]
    pub asr_status: Option<String>,
    /// Maximum aggregate size, mm.
    pub dmax: f64,
    pub curve: CurveType,
    #[serde(default = "default_site_factor")]
    pub site_factor: f64,
}

fn default_site_factor() -> f64 {
    1.0
}

impl Design {
    /// Validates class names and numeric ranges.
    ///
    /// # Examples
    ///
    /// ```
    /// use mixdesign::config::Design;
    /// use mixdesign::standards::CurveType;
    ///
    /// let design = Design {
    ///     target_class: String::from("C30/37"),
    ///     exposure_class: String::from("XC3"),
    ///     lithology: None,
    ///     asr_status: None,
    ///     dmax: 31.5,
    ///     curve: CurveType::B,
    ///     site_factor: 1.0,
    /// };
    /// assert!(design.validate().is_ok());
    ///
    /// let misspelled = Design { exposure_class: String::from("XC"), ..design };
    /// assert!(misspelled.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !matches_pattern(CONCRETE_CLASS_PATTERN, &self.target_class)? {
            return Err(ValidationError::new(&format!(
                "target_class must look like C30/37, got {}",
                self.target_class
            )));
        }
        if !matches_pattern(EXPOSURE_CLASS_PATTERN, &self.exposure_class)? {
            return Err(ValidationError::new(&format!(
                "exposure_class must look like XC3, got {}",
                self.exposure_class
            )));
        }
        if self.dmax <= 0.0 {
            return Err(ValidationError::new(&format!("dmax must be greater than 0, got {}", self.dmax)));
        }
        if !(0.5..=1.5).contains(&self.site_factor) {
            return Err(ValidationError::new(&format!(
                "site_factor must be between 0.5 and 1.5, got {}",
                self.site_factor
            )));
        }
        Ok(())
    }
}

fn matches_pattern(pattern: &str, value: &str) -> Result<bool, ValidationError> {
    let re = Regex::new(pattern).map_err(|e| ValidationError::new(&format!("invalid pattern {}: {}", pattern, e)))?;
    Ok(re.is_match(value.trim()))
}

/// Binder-side dosages, per cubic metre.
#[derive(Debug, Deserialize)]
pub struct Mix {
    /// kg
    pub cement: f64,
    /// L
    pub water: f64,
    /// Fly ash, kg
    #[serde(default)]
    pub ash: f64,
    /// percent
    #[serde(default)]
    pub air: f64,
    /// Admixture, percent of cement mass.
    #[serde(default)]
    pub admixture_percent: f64,
    /// Fixed proportions; the optimizer runs when absent.
    #[serde(default)]
    pub proportions: Option<Vec<f64>>,
}

impl Mix {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.cement <= 0.0 {
            return Err(ValidationError::new(&format!("cement must be greater than 0, got {}", self.cement)));
        }
        if self.water <= 0.0 {
            return Err(ValidationError::new(&format!("water must be greater than 0, got {}", self.water)));
        }
        if self.ash < 0.0 {
            return Err(ValidationError::new(&format!("ash must not be negative, got {}", self.ash)));
        }
        if !(0.0..=10.0).contains(&self.air) {
            return Err(ValidationError::new(&format!("air must be between 0 and 10, got {}", self.air)));
        }
        if !(0.0..=5.0).contains(&self.admixture_percent) {
            return Err(ValidationError::new(&format!(
                "admixture_percent must be between 0 and 5, got {}",
                self.admixture_percent
            )));
        }
        Ok(())
    }

    /// Admixture mass in kg/m³, the unit the strength model is trained on.
    pub fn admixture_mass(&self) -> f64 {
        self.cement * self.admixture_percent / 100.0
    }
}

#[derive(Debug, Deserialize)]
pub struct Trial {
    pub name: String,
    pub proportions: Vec<f64>,
}

impl Trial {
    pub fn validate(&self, materials: &[MaterialSample]) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("trial name must not be empty"));
        }
        BlendProportions(self.proportions.clone())
            .validate(materials)
            .map_err(|e| ValidationError::new(&format!("trial '{}': {}", self.name, e)))
    }
}

/// Optional external inputs; paths are relative to the working directory.
#[derive(Debug, Default, Deserialize)]
pub struct Sources {
    /// CSV pool of past batches.
    #[serde(default)]
    pub records: Option<String>,
    /// TOML replacement for the built-in standard tables.
    #[serde(default)]
    pub tables: Option<String>,
}

/// Loads the design session from a YAML file.
///
/// # Errors
///
/// This function will return an error if reading or parsing the file fails.
/// Validation is left to the caller.
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<DesignConfig, MixError> {
    let content = fs::read_to_string(config_path)?;
    let config: DesignConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

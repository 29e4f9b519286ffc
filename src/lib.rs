// src/lib.rs

#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

pub mod app_logic;
pub mod calibration;
pub mod compliance;
pub mod config;
pub mod error;
pub mod gradation;
pub mod interpolate;
pub mod material;
pub mod optimizer;
pub mod parser;
pub mod qc;
pub mod recipe;
pub mod standards;
pub mod strength;

// Lab-side helpers the browser front end calls directly.
#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = passingFromRetained)]
pub fn passing_from_retained(reference_mass: f64, retained: &[f64]) -> Vec<f64> {
    gradation::passing_from_retained(reference_mass, retained)
}

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = reactiveUpdate)]
pub fn reactive_update(predicted: f64, measured: f64, old_factor: f64) -> f64 {
    calibration::reactive_update(predicted, measured, old_factor)
}

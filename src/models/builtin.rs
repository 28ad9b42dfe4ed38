//! Built-in model functions.
//!
//! Each function is pure and takes its parameters in declared order.

use std::f64::consts::PI;

use ndarray::Array1;

use super::Model;

/// Molar gas constant in kcal/(mol·K).
pub const GAS_CONSTANT_KCAL: f64 = 0.0019872036;

/// `slope * x + intercept`
pub fn linear(x: &Array1<f64>, intercept: f64, slope: f64) -> Array1<f64> {
    x.mapv(|xi| slope * xi + intercept)
}

/// Area-normalised Gaussian: `amp / (sqrt(2π)·wid) · exp(-(x - cen)² / (2·wid²))`
pub fn gaussian_1d(x: &Array1<f64>, amp: f64, cen: f64, wid: f64) -> Array1<f64> {
    let norm = amp / ((2.0 * PI).sqrt() * wid);
    x.mapv(|xi| norm * (-(xi - cen).powi(2) / (2.0 * wid * wid)).exp())
}

/// Parameters of the two-state chemical denaturation model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoState {
    /// Unfolding free energy at zero denaturant, kcal/mol
    pub deltag: f64,
    /// Denaturant dependence of the free energy (m-value)
    pub m: f64,
    pub native_intercept: f64,
    pub unfolded_intercept: f64,
    pub native_slope: f64,
    pub unfolded_slope: f64,
    /// Kelvin
    pub temperature: f64,
}

/// Two-state equilibrium chemical denaturation.
///
/// At denaturant concentration `x` the free energy is `ΔG = deltag + m·x`,
/// the equilibrium constant `K = exp(-ΔG / (R·T))` and the unfolded fraction
/// `f = K / (1 + K)`. The signal is the fraction-weighted mix of the native
/// and unfolded linear baselines.
pub fn two_state(x: &Array1<f64>, p: &TwoState) -> Array1<f64> {
    let rt = GAS_CONSTANT_KCAL * p.temperature;
    x.mapv(|xi| {
        let dg = p.deltag + p.m * xi;
        let k = (-dg / rt).exp();
        // K overflows to +inf for strongly negative dG
        let unfolded = if k.is_infinite() { 1.0 } else { k / (1.0 + k) };
        let native_base = p.native_intercept + p.native_slope * xi;
        let unfolded_base = p.unfolded_intercept + p.unfolded_slope * xi;
        unfolded * unfolded_base + (1.0 - unfolded) * native_base
    })
}

pub(super) fn builtin_models() -> Vec<Model> {
    vec![
        Model::new(
            "linear",
            &[("intercept", 0.0), ("slope", 1.0)],
            |x, v| linear(x, v[0], v[1]),
        )
        .with_aliases(&["line"])
        .with_description("y = slope * x + intercept"),
        Model::new(
            "gaussian_1d",
            &[("amp", 1.0), ("cen", 1.0), ("wid", 1.0)],
            |x, v| gaussian_1d(x, v[0], v[1], v[2]),
        )
        .with_aliases(&["gauss", "gaussian", "1dgauss"])
        .with_description("y = amp/(sqrt(2*pi)*wid) * exp(-(x-cen)^2 / (2*wid^2))"),
        Model::new(
            "two_state_equilibrium_chemical_denaturation",
            &[
                ("deltag", 5.0),
                ("m", 1.8),
                ("nativeyint", 0.0),
                ("unfoldedyint", 250_000.0),
                ("nativeyslope", 1000.0),
                ("unfoldedyslope", 2.0),
                ("temperature", 298.15),
            ],
            |x, v| {
                two_state(
                    x,
                    &TwoState {
                        deltag: v[0],
                        m: v[1],
                        native_intercept: v[2],
                        unfolded_intercept: v[3],
                        native_slope: v[4],
                        unfolded_slope: v[5],
                        temperature: v[6],
                    },
                )
            },
        )
        .with_aliases(&["two_state"])
        .with_description(
            "two-state unfolding: dG = deltag + m*x, K = exp(-dG/(R*T)), \
             signal mixes native and unfolded baselines by K/(1+K)",
        ),
    ]
}

//! Configuration options for the Levenberg-Marquardt algorithm.
//!
//! Convergence tolerances and the evaluation cap come from
//! [`MinimizerOptions`](crate::minimizer::MinimizerOptions); this struct only
//! holds the damping schedule and the differentiation step.

use serde::{Deserialize, Serialize};

/// Damping and differentiation settings for [`LevenbergMarquardt`](super::LevenbergMarquardt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmConfig {
    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda; exceeding it ends the run as failed. Default: 1e12
    pub max_lambda: f64,

    /// Relative forward-difference step. Default: None (1e-8)
    pub diff_step: Option<f64>,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
            diff_step: None,
        }
    }
}

//! Error-landscape analysis: chi-square as a function of one parameter.
//!
//! The chosen parameter is held at a series of values around its fitted
//! value while every other free parameter is refit. The resulting profile
//! shows how well the data constrain the parameter.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SavukaError};
use crate::parameters::{ParameterError, QualifiedName};

use super::driver::FitDriver;
use super::result::{FitResult, FitState};

/// Sampling of the error landscape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandscapeConfig {
    /// Number of values to sample. Default: 21
    pub samples: usize,

    /// Half-width of the sampled range as a fraction of the fitted value. Default: 0.1
    pub window: f64,
}

impl Default for LandscapeConfig {
    fn default() -> Self {
        Self {
            samples: 21,
            window: 0.1,
        }
    }
}

impl LandscapeConfig {
    pub fn new(samples: usize, window: f64) -> Self {
        Self { samples, window }
    }

    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            return Err(SavukaError::InvalidInput(
                "an error landscape needs at least one sample".to_string(),
            ));
        }
        if !(self.window.is_finite() && self.window >= 0.0) {
            return Err(SavukaError::InvalidInput(format!(
                "landscape window must be a non-negative number, got {}",
                self.window
            )));
        }
        Ok(())
    }

    /// Relative offsets, evenly spaced over `[-window, window]`.
    ///
    /// Symmetric about zero; an odd sample count includes exactly `0.0`, a
    /// single sample is `[0.0]`.
    pub fn offsets(&self) -> Vec<f64> {
        if self.samples <= 1 {
            return vec![0.0; self.samples];
        }
        let span = (self.samples - 1) as f64;
        (0..self.samples)
            .map(|i| self.window * (2.0 * i as f64 - span) / span)
            .collect()
    }
}

/// Chi-square profile of one parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLandscape {
    /// Base name of the sampled parameter
    pub parameter: String,

    /// Relative offset of each sample from the fitted value
    pub offsets: Vec<f64>,

    pub chi_square: Vec<f64>,

    pub reduced_chi_square: Vec<f64>,

    /// Outcome of each refit
    pub states: Vec<FitState>,
}

impl ErrorLandscape {
    /// Statistic of each sample: the reduced chi-square.
    pub fn statistic(&self) -> &[f64] {
        &self.reduced_chi_square
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// `(offset, reduced chi-square)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.offsets
            .iter()
            .copied()
            .zip(self.reduced_chi_square.iter().copied())
    }

    /// Offset with the lowest statistic.
    pub fn best_offset(&self) -> Option<f64> {
        self.points()
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(offset, _)| offset)
    }
}

/// Profile `parameter` (a base name) around the fit in `result`.
///
/// For every offset the fitted parameter set is deep-copied, each unlinked
/// record with base `parameter` is fixed at `value * (1 + offset)`, and the
/// remaining free records are refit on the same data. Records linked to a
/// fixed record follow it. `result` is not modified.
pub fn analyze(
    driver: &FitDriver,
    result: &FitResult,
    parameter: &str,
    config: &LandscapeConfig,
) -> Result<ErrorLandscape> {
    config.validate()?;

    let matching: Vec<(QualifiedName, f64, bool)> = result
        .params
        .records_for_base(parameter)
        .map(|p| (p.key().clone(), p.value(), p.is_linked()))
        .collect();
    if matching.is_empty() {
        return Err(ParameterError::ParameterNotFound {
            name: parameter.to_string(),
        }
        .into());
    }
    let targets: Vec<(QualifiedName, f64)> = matching
        .into_iter()
        .filter(|(_, _, linked)| !linked)
        .map(|(key, value, _)| (key, value))
        .collect();
    if targets.is_empty() {
        return Err(SavukaError::InvalidInput(format!(
            "every '{parameter}' record follows a link to another parameter"
        )));
    }

    let offsets = config.offsets();
    let mut landscape = ErrorLandscape {
        parameter: parameter.to_string(),
        offsets: offsets.clone(),
        chi_square: Vec::with_capacity(offsets.len()),
        reduced_chi_square: Vec::with_capacity(offsets.len()),
        states: Vec::with_capacity(offsets.len()),
    };

    let cancel = driver.cancel_token();
    for (i, offset) in offsets.iter().enumerate() {
        cancel.check()?;
        let mut params = result.params.deep_copy();
        for (key, value) in &targets {
            params.fix(key, value * (1.0 + offset))?;
        }
        let refit = driver.refit(result, &params)?;
        log::debug!(
            "landscape '{}' sample {}/{}: offset {:+.4}, reduced chi-square {:.6e}",
            parameter,
            i + 1,
            offsets.len(),
            offset,
            refit.redchi
        );
        landscape.chi_square.push(refit.chisqr);
        landscape.reduced_chi_square.push(refit.redchi);
        landscape.states.push(refit.state);
    }

    Ok(landscape)
}

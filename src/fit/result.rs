//! Fit results and their derived views.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SavukaError};
use crate::models::Model;
use crate::parameters::{ParameterSet, QualifiedName};
use crate::residual::{generate_curve, FitData};

use super::config::FitMode;

/// Correlations at or below this magnitude are left out of [`FitResult::report`].
const MIN_REPORTED_CORRELATION: f64 = 0.1;

/// Lifecycle of a fit: `Configuring -> Running -> (Converged | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FitState {
    Configuring,
    Running,
    Converged,
    Failed,
}

impl FitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FitState::Converged | FitState::Failed)
    }
}

impl fmt::Display for FitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FitState::Configuring => "CONFIGURING",
            FitState::Running => "RUNNING",
            FitState::Converged => "CONVERGED",
            FitState::Failed => "FAILED",
        };
        f.write_str(text)
    }
}

/// Observed, predicted and residual series of one buffer, for plotting.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    /// Session buffer the series belongs to
    pub source: usize,
    pub x: Array1<f64>,
    pub observed: Array1<f64>,
    pub predicted: Array1<f64>,
    pub residual: Array1<f64>,
}

/// Outcome of one minimization. A result is complete once the driver returns
/// it and is never modified afterwards.
#[derive(Debug, Clone)]
pub struct FitResult {
    /// Fitted parameters, with `stderr` set when uncertainties were computed
    pub params: ParameterSet,

    /// Parameters the fit started from
    pub init_params: ParameterSet,

    /// Data the fit ran on; positions map to session buffers through `data.sources()`
    pub data: FitData,

    pub model: Arc<Model>,

    pub mode: FitMode,

    /// Flattened `observed - predicted` at the fitted parameters
    pub residual: Array1<f64>,

    /// Sum of squared residuals
    pub chisqr: f64,

    /// `chisqr / max(1, ndata - nvarys)`
    pub redchi: f64,

    pub ndata: usize,

    /// Number of free records
    pub nvarys: usize,

    pub nfev: usize,

    pub iterations: usize,

    /// `Converged` or `Failed`
    pub state: FitState,

    pub message: String,

    /// Name of the minimizer that produced the result
    pub method: String,

    /// Free record keys, in covariance row order
    pub var_names: Vec<QualifiedName>,

    pub covariance: Option<Array2<f64>>,
}

impl FitResult {
    pub fn success(&self) -> bool {
        self.state == FitState::Converged
    }

    /// Number of fit positions (buffers) the result covers.
    pub fn buffer_count(&self) -> usize {
        self.data.buffer_count()
    }

    /// Model curve of fit position `buffer` at the fitted parameters.
    pub fn curve(&self, buffer: usize) -> Result<Array1<f64>> {
        self.check_buffer(buffer)?;
        generate_curve(&self.params, buffer, self.data.x(), &self.model)
    }

    /// Model curve of fit position `buffer` on an arbitrary x-axis.
    pub fn curve_at(&self, buffer: usize, x: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_buffer(buffer)?;
        generate_curve(&self.params, buffer, x, &self.model)
    }

    /// Residual segment of fit position `buffer`.
    pub fn residuals_for(&self, buffer: usize) -> Result<Array1<f64>> {
        self.check_buffer(buffer)?;
        if self.residual.len() != self.data.ndata() {
            return Err(SavukaError::DimensionMismatch(format!(
                "{} residuals for {} data points",
                self.residual.len(),
                self.data.ndata()
            )));
        }
        let range = self.data.segment(buffer);
        Ok(self.residual.slice(ndarray::s![range]).to_owned())
    }

    /// Observed, predicted and residual series of fit position `buffer`.
    pub fn plot_series(&self, buffer: usize) -> Result<PlotSeries> {
        let observed = self
            .data
            .y(buffer)
            .cloned()
            .ok_or_else(|| self.missing_buffer(buffer))?;
        Ok(PlotSeries {
            source: self.data.sources()[buffer],
            x: self.data.x().clone(),
            observed,
            predicted: self.curve(buffer)?,
            residual: self.residuals_for(buffer)?,
        })
    }

    /// Plot series of every fit position, in order.
    pub fn plot_all(&self) -> Result<Vec<PlotSeries>> {
        (0..self.buffer_count()).map(|b| self.plot_series(b)).collect()
    }

    /// Correlation matrix derived from the covariance.
    pub fn correlation(&self) -> Option<Array2<f64>> {
        self.covariance
            .as_ref()
            .map(crate::uncertainty::calculate_correlation)
    }

    /// `Err(NonConvergence)` unless the fit converged.
    pub fn ensure_converged(&self) -> Result<&Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(SavukaError::NonConvergence(self.message.clone()))
        }
    }

    /// Multi-line text report of statistics, parameters and correlations.
    pub fn report(&self) -> String {
        self.to_string()
    }

    fn check_buffer(&self, buffer: usize) -> Result<()> {
        if buffer < self.buffer_count() {
            Ok(())
        } else {
            Err(self.missing_buffer(buffer))
        }
    }

    fn missing_buffer(&self, buffer: usize) -> SavukaError {
        SavukaError::BufferNotFound {
            index: buffer,
            len: self.buffer_count(),
        }
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[[Model]]")?;
        writeln!(f, "    {} ({} fit)", self.model.name(), self.mode)?;
        writeln!(f, "[[Fit Statistics]]")?;
        writeln!(f, "    # fitting method   = {}", self.method)?;
        writeln!(f, "    # function evals   = {}", self.nfev)?;
        writeln!(f, "    # data points      = {}", self.ndata)?;
        writeln!(f, "    # variables        = {}", self.nvarys)?;
        writeln!(f, "    # buffers          = {:?}", self.data.sources())?;
        writeln!(f, "    chi-square         = {:.8e}", self.chisqr)?;
        writeln!(f, "    reduced chi-square = {:.8e}", self.redchi)?;
        writeln!(f, "    state              = {} ({})", self.state, self.message)?;
        if !self.data.resampled().is_empty() {
            writeln!(f, "    resampled          = {:?}", self.data.resampled())?;
        }

        writeln!(f, "[[Variables]]")?;
        let width = self.params.keys().map(|k| k.to_string().len()).max().unwrap_or(0);
        for record in self.params.iter() {
            let name = format!("{}:", record.name());
            write!(f, "    {name:<w$} {:.8e}", record.value(), w = width + 1)?;
            if let Some(target) = record.link() {
                writeln!(f, " (linked to {target})")?;
            } else if !record.vary {
                writeln!(f, " (fixed)")?;
            } else {
                if let Some(stderr) = record.stderr {
                    write!(f, " +/- {stderr:.8e}")?;
                }
                writeln!(f, " (init = {})", record.init_value())?;
            }
        }

        if let Some(correl) = self.correlation() {
            let mut pairs = Vec::new();
            for i in 0..self.var_names.len() {
                for j in (i + 1)..self.var_names.len() {
                    let c = correl[[i, j]];
                    if c.abs() > MIN_REPORTED_CORRELATION {
                        pairs.push((&self.var_names[i], &self.var_names[j], c));
                    }
                }
            }
            if !pairs.is_empty() {
                pairs.sort_by(|a, b| b.2.abs().total_cmp(&a.2.abs()));
                writeln!(
                    f,
                    "[[Correlations]] (unreported correlations are < {MIN_REPORTED_CORRELATION:.3})"
                )?;
                for (a, b, c) in pairs {
                    writeln!(f, "    C({a}, {b}) = {c:+.4}")?;
                }
            }
        }
        Ok(())
    }
}

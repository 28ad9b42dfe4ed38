//! Pluggable minimizer interface.
//!
//! The fit driver hands a [`Problem`] and [`MinimizerOptions`] to any
//! [`Minimizer`]; the crate ships [`LevenbergMarquardt`](crate::lm::LevenbergMarquardt)
//! as the built-in implementation.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SavukaError};
use crate::problem::Problem;

/// Numerical method requested from the minimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Damped Gauss-Newton (Levenberg-Marquardt) least squares
    #[default]
    LeastSquares,
}

impl Method {
    const ALIASES: &'static [(&'static str, Method)] = &[
        ("least_squares", Method::LeastSquares),
        ("leastsq", Method::LeastSquares),
        ("lm", Method::LeastSquares),
        ("levenberg_marquardt", Method::LeastSquares),
    ];

    /// Accepted method names.
    pub fn names() -> Vec<String> {
        Self::ALIASES.iter().map(|(name, _)| name.to_string()).collect()
    }
}

impl FromStr for Method {
    type Err = SavukaError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALIASES
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, method)| *method)
            .ok_or_else(|| SavukaError::UnknownMethod {
                name: s.to_string(),
                available: Self::names(),
            })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::LeastSquares => write!(f, "least_squares"),
        }
    }
}

/// Handling of NaN or infinite residual entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Fail the evaluation with [`SavukaError::NonFiniteResidual`]
    #[default]
    Raise,
    /// Pass non-finite values through; the minimizer rejects such steps
    Propagate,
    /// Zero non-finite entries so they do not contribute to the cost
    Drop,
}

impl NanPolicy {
    /// Apply the policy to a residual vector in place.
    pub fn apply(self, residuals: &mut Array1<f64>) -> Result<()> {
        match self {
            NanPolicy::Propagate => Ok(()),
            NanPolicy::Raise => {
                let count = residuals.iter().filter(|r| !r.is_finite()).count();
                if count > 0 {
                    Err(SavukaError::NonFiniteResidual { count })
                } else {
                    Ok(())
                }
            }
            NanPolicy::Drop => {
                residuals.mapv_inplace(|r| if r.is_finite() { r } else { 0.0 });
                Ok(())
            }
        }
    }
}

impl FromStr for NanPolicy {
    type Err = SavukaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(NanPolicy::Raise),
            "propagate" => Ok(NanPolicy::Propagate),
            "omit" | "drop" => Ok(NanPolicy::Drop),
            other => Err(SavukaError::InvalidInput(format!(
                "unknown nan policy '{other}'; expected raise, propagate or drop"
            ))),
        }
    }
}

/// Snapshot handed to an [`IterationCallback`] after every accepted step.
#[derive(Debug, Clone)]
pub struct Iteration<'a> {
    pub iteration: usize,
    pub nfev: usize,
    pub cost: f64,
    /// Current values of the free parameters, as `name=value` text
    pub trace: &'a str,
}

/// Observer called by the minimizer after every accepted step.
#[derive(Clone)]
pub struct IterationCallback(Arc<dyn Fn(&Iteration<'_>) + Send + Sync>);

impl IterationCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Iteration<'_>) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, iteration: &Iteration<'_>) {
        (self.0)(iteration)
    }
}

impl fmt::Debug for IterationCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IterationCallback(..)")
    }
}

/// Options passed to the minimizer for one minimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerOptions {
    pub method: Method,

    /// Emit one `log::debug!` parameter trace per accepted step. Default: false
    pub debug: bool,

    pub nan_policy: NanPolicy,

    /// Relative reduction of the cost below which the fit has converged. Default: 1.5e-8
    pub ftol: f64,

    /// Relative step size below which the fit has converged. Default: 1.5e-8
    pub xtol: f64,

    /// Orthogonality between residuals and Jacobian columns below which the fit has converged. Default: 1e-10
    pub gtol: f64,

    /// Cap on residual evaluations, Jacobian columns included. Default: 2000
    pub max_evaluations: usize,

    #[serde(skip)]
    pub callback: Option<IterationCallback>,
}

impl Default for MinimizerOptions {
    fn default() -> Self {
        Self {
            method: Method::default(),
            debug: false,
            nan_policy: NanPolicy::default(),
            ftol: 1.5e-8,
            xtol: 1.5e-8,
            gtol: 1e-10,
            max_evaluations: 2000,
            callback: None,
        }
    }
}

impl MinimizerOptions {
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_nan_policy(mut self, nan_policy: NanPolicy) -> Self {
        self.nan_policy = nan_policy;
        self
    }

    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.ftol = ftol;
        self
    }

    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.xtol = xtol;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    pub fn with_callback(mut self, callback: IterationCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Reject tolerances and caps the minimizer cannot work with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SavukaError::InvalidInput(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.max_evaluations == 0 {
            return Err(SavukaError::InvalidInput(
                "max_evaluations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one minimization, in the problem's internal coordinates.
#[derive(Debug, Clone)]
pub struct MinimizerReport {
    /// Best parameter values found
    pub params: Array1<f64>,

    /// Residuals at `params`
    pub residuals: Array1<f64>,

    /// Sum of squared residuals at `params`
    pub cost: f64,

    pub iterations: usize,

    /// Number of residual evaluations
    pub nfev: usize,

    pub success: bool,

    pub message: String,
}

impl fmt::Display for MinimizerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Minimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.nfev)?;
        Ok(())
    }
}

/// A nonlinear least-squares minimizer.
///
/// Implementations must not retry on failure: a run that stops without
/// converging returns `success = false` with the best parameters found.
/// Errors are reserved for evaluation failures (for example the `raise` NaN
/// policy) and invalid input.
pub trait Minimizer: Send + Sync {
    fn minimize(
        &self,
        problem: &dyn Problem,
        initial: Array1<f64>,
        options: &MinimizerOptions,
    ) -> Result<MinimizerReport>;

    /// Short name used in fit reports.
    fn name(&self) -> &str {
        "custom"
    }
}

//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Each iteration solves the damped normal equations
//! `(JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr` with a Cholesky factorisation, falling back
//! to LU when the damped matrix is not numerically positive definite. Accepted
//! steps shrink λ, rejected steps grow it.

use nalgebra::{DMatrix, DVector};
use ndarray::Array1;

use crate::error::{Result, SavukaError};
use crate::minimizer::{Iteration, Minimizer, MinimizerOptions, MinimizerReport};
use crate::problem::Problem;
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

use super::config::LmConfig;

/// Status of the iteration.
enum IterationStatus {
    /// Converged successfully
    Converged(String),

    /// Stopped without converging
    Failed(String),
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the initial value for the damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Set the factor by which to increase lambda.
    pub fn with_lambda_up_factor(mut self, factor: f64) -> Self {
        self.config.lambda_up_factor = factor;
        self
    }

    /// Set the factor by which to decrease lambda.
    pub fn with_lambda_down_factor(mut self, factor: f64) -> Self {
        self.config.lambda_down_factor = factor;
        self
    }

    /// Set the relative step used for the finite-difference Jacobian.
    pub fn with_diff_step(mut self, step: f64) -> Self {
        self.config.diff_step = Some(step);
        self
    }

    /// Solve the damped normal equations. `None` when both factorisations fail.
    fn calculate_step(
        &self,
        jtj: &DMatrix<f64>,
        gradient: &DVector<f64>,
        scale: &DVector<f64>,
        lambda: f64,
    ) -> Option<DVector<f64>> {
        let mut damped = jtj.clone();
        for k in 0..damped.nrows() {
            damped[(k, k)] += lambda * scale[k];
        }
        let rhs = -gradient;

        let step = match damped.clone().cholesky() {
            Some(cholesky) => cholesky.solve(&rhs),
            None => damped.lu().solve(&rhs)?,
        };
        step.iter().all(|v| v.is_finite()).then_some(step)
    }

    fn report_iteration(
        &self,
        problem: &dyn Problem,
        options: &MinimizerOptions,
        iteration: usize,
        nfev: usize,
        cost: f64,
        params: &Array1<f64>,
    ) {
        if !options.debug && options.callback.is_none() {
            return;
        }
        let trace = problem.trace(params);
        if options.debug {
            log::debug!("iteration {iteration}: nfev={nfev} cost={cost:.6e} [{trace}]");
        }
        if let Some(callback) = &options.callback {
            callback.call(&Iteration {
                iteration,
                nfev,
                cost,
                trace: &trace,
            });
        }
    }
}

fn sum_of_squares(residuals: &Array1<f64>) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// Largest cosine between the residual vector and a Jacobian column.
fn gradient_cosine(jacobian: &DMatrix<f64>, gradient: &DVector<f64>, residual_norm: f64) -> f64 {
    (0..jacobian.ncols())
        .filter_map(|k| {
            let column_norm = jacobian.column(k).norm();
            (column_norm > 0.0 && residual_norm > 0.0)
                .then(|| (gradient[k] / (column_norm * residual_norm)).abs())
        })
        .fold(0.0, f64::max)
}

impl Minimizer for LevenbergMarquardt {
    fn minimize(
        &self,
        problem: &dyn Problem,
        initial: Array1<f64>,
        options: &MinimizerOptions,
    ) -> Result<MinimizerReport> {
        options.validate()?;

        let n_params = problem.parameter_count();
        if initial.len() != n_params {
            return Err(SavukaError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial.len()
            )));
        }

        let max_nfev = options.max_evaluations;
        let mut params = initial;
        let mut residuals = problem.eval(&params)?;
        let mut nfev = 1;
        let mut cost = sum_of_squares(&residuals);
        let mut iterations = 0;
        let mut lambda = self.config.initial_lambda;

        let status = if !cost.is_finite() {
            IterationStatus::Failed("residuals at the starting point are not finite".to_string())
        } else if n_params == 0 {
            IterationStatus::Converged("no free parameters".to_string())
        } else {
            'outer: loop {
                if cost == 0.0 {
                    break IterationStatus::Converged("residuals are exactly zero".to_string());
                }
                if nfev + n_params > max_nfev {
                    break IterationStatus::Failed(format!(
                        "maximum number of function evaluations ({max_nfev}) reached"
                    ));
                }

                let jacobian = problem.jacobian(&params, Some(&residuals), self.config.diff_step)?;
                nfev += n_params;
                if jacobian.iter().any(|v| !v.is_finite()) {
                    break IterationStatus::Failed(
                        "Jacobian contains non-finite values".to_string(),
                    );
                }

                let j = ndarray_to_nalgebra(&jacobian);
                let r = ndarray_vec_to_nalgebra(&residuals);
                let jt = j.transpose();
                let jtj = &jt * &j;
                let gradient = &jt * &r;

                let cosine = gradient_cosine(&j, &gradient, r.norm());
                if cosine <= options.gtol {
                    break IterationStatus::Converged(format!(
                        "gradient orthogonal to residuals: {cosine:.2e} <= gtol {:.2e}",
                        options.gtol
                    ));
                }

                // Marquardt scaling; flat directions keep a tiny positive weight.
                let scale = jtj.diagonal().map(|d| d.max(f64::EPSILON));
                let params_norm = params.iter().map(|p| p * p).sum::<f64>().sqrt();

                loop {
                    if nfev >= max_nfev {
                        break 'outer IterationStatus::Failed(format!(
                            "maximum number of function evaluations ({max_nfev}) reached"
                        ));
                    }

                    let Some(step) = self.calculate_step(&jtj, &gradient, &scale, lambda) else {
                        lambda *= self.config.lambda_up_factor;
                        if lambda > self.config.max_lambda {
                            break 'outer IterationStatus::Failed(
                                "damped normal equations could not be solved".to_string(),
                            );
                        }
                        continue;
                    };

                    let trial = &params + &nalgebra_vec_to_ndarray(&step);
                    let trial_residuals = problem.eval(&trial)?;
                    nfev += 1;
                    let trial_cost = sum_of_squares(&trial_residuals);

                    if trial_cost.is_finite() && trial_cost < cost {
                        let reduction = (cost - trial_cost) / cost;
                        let step_size = step.norm() / (params_norm + options.xtol);

                        params = trial;
                        residuals = trial_residuals;
                        cost = trial_cost;
                        iterations += 1;
                        lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                        self.report_iteration(problem, options, iterations, nfev, cost, &params);

                        if reduction <= options.ftol {
                            break 'outer IterationStatus::Converged(format!(
                                "relative reduction in cost {reduction:.2e} <= ftol {:.2e}",
                                options.ftol
                            ));
                        }
                        if step_size <= options.xtol {
                            break 'outer IterationStatus::Converged(format!(
                                "relative step size {step_size:.2e} <= xtol {:.2e}",
                                options.xtol
                            ));
                        }
                        break;
                    }

                    // Rejected, but the cost is flat to within ftol: nothing left to gain.
                    if trial_cost.is_finite() && (trial_cost - cost).abs() <= options.ftol * cost {
                        break 'outer IterationStatus::Converged(format!(
                            "cost cannot be reduced further within ftol {:.2e}",
                            options.ftol
                        ));
                    }

                    lambda *= self.config.lambda_up_factor;
                    if lambda > self.config.max_lambda {
                        break 'outer IterationStatus::Failed(
                            "failed to decrease cost, and lambda reached maximum".to_string(),
                        );
                    }
                }
            }
        };

        let (success, message) = match status {
            IterationStatus::Converged(message) => (true, message),
            IterationStatus::Failed(message) => (false, message),
        };
        log::debug!(
            "levenberg-marquardt finished: success={success} iterations={iterations} nfev={nfev} ({message})"
        );

        Ok(MinimizerReport {
            params,
            residuals,
            cost,
            iterations,
            nfev,
            success,
            message,
        })
    }

    fn name(&self) -> &str {
        "levenberg_marquardt"
    }
}

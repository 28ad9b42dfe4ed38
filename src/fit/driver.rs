//! Fit driver: runs global and independent fits over a set of buffers.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};

use crate::dataset::Dataset;
use crate::error::{Result, SavukaError};
use crate::lm::LevenbergMarquardt;
use crate::minimizer::{Minimizer, MinimizerReport};
use crate::models::Model;
use crate::parameters::{ParameterError, ParameterSet, QualifiedName};
use crate::problem::{ParameterProblem, Problem};
use crate::residual::FitData;
use crate::uncertainty::{calculate_covariance, standard_errors_from_covariance};

use super::cancel::CancellationToken;
use super::config::{FitConfig, FitMode};
use super::result::{FitResult, FitState};

/// Orchestrates minimizations.
///
/// A global fit performs one minimization over every buffer and returns one
/// result; an independent fit performs one minimization per buffer and
/// returns one result per buffer, in input order. The caller's parameter set
/// is never mutated: every fit works on a deep copy.
#[derive(Clone)]
pub struct FitDriver {
    minimizer: Arc<dyn Minimizer>,
    config: FitConfig,
    cancel: CancellationToken,
}

impl Default for FitDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FitDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FitDriver")
            .field("minimizer", &self.minimizer.name())
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl FitDriver {
    /// Driver using the built-in Levenberg-Marquardt minimizer.
    pub fn new() -> Self {
        Self {
            minimizer: Arc::new(LevenbergMarquardt::new()),
            config: FitConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_minimizer(mut self, minimizer: Arc<dyn Minimizer>) -> Self {
        self.minimizer = minimizer;
        self
    }

    pub fn with_config(mut self, config: FitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &FitConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FitConfig {
        &mut self.config
    }

    pub fn minimizer(&self) -> &dyn Minimizer {
        self.minimizer.as_ref()
    }

    /// Token checked before each sub-fit; cancel it from another thread to
    /// stop an independent fit or an error landscape between minimizations.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Fit `model` to `datasets`.
    ///
    /// A global fit aligns the datasets on the first one's x-axis according
    /// to the configured [`ResamplePolicy`](crate::residual::ResamplePolicy);
    /// an independent fit keeps every dataset on its own axis. Without
    /// `params` every record starts at the model defaults.
    pub fn fit(
        &self,
        datasets: &[Dataset],
        model: Arc<Model>,
        params: Option<&ParameterSet>,
        mode: FitMode,
    ) -> Result<Vec<FitResult>> {
        let sources: Vec<usize> = (0..datasets.len()).collect();
        self.fit_sources(datasets, &sources, model, params, mode)
    }

    /// [`fit`](Self::fit), recording `sources[i]` as the session buffer
    /// behind `datasets[i]`.
    pub fn fit_sources(
        &self,
        datasets: &[Dataset],
        sources: &[usize],
        model: Arc<Model>,
        params: Option<&ParameterSet>,
        mode: FitMode,
    ) -> Result<Vec<FitResult>> {
        if sources.len() != datasets.len() {
            return Err(SavukaError::DimensionMismatch(format!(
                "{} source indices for {} buffers",
                sources.len(),
                datasets.len()
            )));
        }
        match mode {
            FitMode::Global => {
                let data = FitData::from_datasets(datasets, self.config.resample)?
                    .with_sources(sources.to_vec())?;
                self.fit_data(data, model, params, mode)
            }
            FitMode::Independent => {
                if datasets.is_empty() {
                    return Err(SavukaError::InvalidInput(
                        "a fit needs at least one buffer".to_string(),
                    ));
                }
                self.config.minimizer.validate()?;
                let params = self.starting_params(&model, params, datasets.len())?;
                log::debug!(
                    "{} fit of '{}' on buffers {:?}: {}",
                    mode,
                    model.name(),
                    sources,
                    FitState::Configuring
                );

                let mut jobs = Vec::with_capacity(datasets.len());
                for (position, (dataset, &source)) in datasets.iter().zip(sources).enumerate() {
                    let sub_data =
                        FitData::from_datasets(std::slice::from_ref(dataset), self.config.resample)?
                            .with_sources(vec![source])?;
                    jobs.push((params.for_buffer(position)?, sub_data));
                }
                self.run_independent(jobs, &model)
            }
        }
    }

    /// Fit `model` to already aligned data.
    ///
    /// In independent mode every buffer is fitted on the shared x-axis of
    /// `data`; use [`fit`](Self::fit) to keep each buffer on its own axis.
    pub fn fit_data(
        &self,
        data: FitData,
        model: Arc<Model>,
        params: Option<&ParameterSet>,
        mode: FitMode,
    ) -> Result<Vec<FitResult>> {
        self.config.minimizer.validate()?;

        let buffers = data.buffer_count();
        let params = self.starting_params(&model, params, buffers)?;
        log::debug!(
            "{} fit of '{}' on buffers {:?}: {}",
            mode,
            model.name(),
            data.sources(),
            FitState::Configuring
        );

        match mode {
            FitMode::Global => {
                self.cancel.check()?;
                Ok(vec![self.run(params, data, model, mode)?])
            }
            FitMode::Independent => {
                let mut jobs = Vec::with_capacity(buffers);
                for buffer in 0..buffers {
                    let sub_params = params.for_buffer(buffer)?;
                    let sub_data = data.single(buffer).ok_or(SavukaError::BufferNotFound {
                        index: buffer,
                        len: buffers,
                    })?;
                    jobs.push((sub_params, sub_data));
                }
                self.run_independent(jobs, &model)
            }
        }
    }

    /// Deep copy of the caller's set, checked against `model`, or the model
    /// defaults.
    fn starting_params(
        &self,
        model: &Model,
        params: Option<&ParameterSet>,
        buffers: usize,
    ) -> Result<ParameterSet> {
        match params {
            Some(params) => {
                params.check_model(model, buffers)?;
                Ok(params.deep_copy())
            }
            None => Ok(ParameterSet::create_default(model, buffers)),
        }
    }

    /// Run a fresh fit on `result`'s data and model, starting from `params`.
    pub fn refit(&self, result: &FitResult, params: &ParameterSet) -> Result<FitResult> {
        self.config.minimizer.validate()?;
        params.check_model(&result.model, result.buffer_count())?;
        self.cancel.check()?;
        self.run(
            params.deep_copy(),
            result.data.clone(),
            Arc::clone(&result.model),
            result.mode,
        )
    }

    /// Re-run the fit that produced `result` from its starting parameters.
    pub fn replay(&self, result: &FitResult) -> Result<FitResult> {
        self.refit(result, &result.init_params)
    }

    #[cfg(feature = "parallel")]
    fn run_independent(
        &self,
        jobs: Vec<(ParameterSet, FitData)>,
        model: &Arc<Model>,
    ) -> Result<Vec<FitResult>> {
        use rayon::prelude::*;

        if !self.config.parallel {
            return self.run_sequential(jobs, model);
        }
        jobs.into_par_iter()
            .map(|(params, data)| {
                self.cancel.check()?;
                self.run(params, data, Arc::clone(model), FitMode::Independent)
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn run_independent(
        &self,
        jobs: Vec<(ParameterSet, FitData)>,
        model: &Arc<Model>,
    ) -> Result<Vec<FitResult>> {
        self.run_sequential(jobs, model)
    }

    fn run_sequential(
        &self,
        jobs: Vec<(ParameterSet, FitData)>,
        model: &Arc<Model>,
    ) -> Result<Vec<FitResult>> {
        jobs.into_iter()
            .map(|(params, data)| {
                self.cancel.check()?;
                self.run(params, data, Arc::clone(model), FitMode::Independent)
            })
            .collect()
    }

    /// One minimization: `Running` until the minimizer returns, then
    /// `Converged` or `Failed`.
    fn run(
        &self,
        params: ParameterSet,
        data: FitData,
        model: Arc<Model>,
        mode: FitMode,
    ) -> Result<FitResult> {
        let options = &self.config.minimizer;
        let problem = ParameterProblem::new(&params, &data, &model, options.nan_policy);
        let initial = problem.initial_internal()?;
        let nvarys = problem.parameter_count();

        log::debug!(
            "{} -> {} ({} free parameter(s), {} data points)",
            FitState::Configuring,
            FitState::Running,
            nvarys,
            data.ndata()
        );

        let report = if nvarys == 0 {
            let residuals = problem.eval(&initial)?;
            MinimizerReport {
                cost: residuals.iter().map(|r| r * r).sum(),
                params: initial,
                residuals,
                iterations: 0,
                nfev: 1,
                success: true,
                message: "no free parameters".to_string(),
            }
        } else {
            self.minimizer.minimize(&problem, initial, options)?
        };

        let mut fitted = problem.apply(&report.params)?;
        let ndata = data.ndata();
        let chisqr = report.cost;
        let redchi = chisqr / ndata.saturating_sub(nvarys).max(1) as f64;

        let covariance = if self.config.compute_uncertainties && nvarys > 0 {
            match external_covariance(&problem, &report, redchi) {
                Ok(covar) => {
                    assign_stderr(&mut fitted, problem.free_keys(), &covar)?;
                    Some(covar)
                }
                Err(e) => {
                    log::warn!("uncertainties not estimated for '{}': {}", model.name(), e);
                    None
                }
            }
        } else {
            None
        };

        let state = if report.success {
            FitState::Converged
        } else {
            FitState::Failed
        };
        if state == FitState::Failed {
            log::warn!(
                "{} fit of '{}' on buffers {:?} {}: {}",
                mode,
                model.name(),
                data.sources(),
                state,
                report.message
            );
        } else {
            log::debug!(
                "{} -> {} after {} evaluation(s): {}",
                FitState::Running,
                state,
                report.nfev,
                report.message
            );
        }

        let var_names = problem.free_keys().to_vec();
        Ok(FitResult {
            init_params: params.deep_copy(),
            params: fitted,
            data,
            model,
            mode,
            residual: report.residuals,
            chisqr,
            redchi,
            ndata,
            nvarys,
            nfev: report.nfev,
            iterations: report.iterations,
            state,
            message: report.message,
            method: self.minimizer.name().to_string(),
            var_names,
            covariance,
        })
    }
}

/// Covariance of the free records in external coordinates.
///
/// Estimated in the minimizer's internal coordinates and mapped back with the
/// bounds-transform derivatives: `C_ext = D C_int D`.
fn external_covariance(
    problem: &ParameterProblem<'_>,
    report: &MinimizerReport,
    redchi: f64,
) -> Result<Array2<f64>> {
    let jacobian = problem.jacobian(&report.params, Some(&report.residuals), None)?;
    if jacobian.iter().any(|v| !v.is_finite()) {
        return Err(SavukaError::LinearAlgebra(
            "Jacobian at the solution is not finite".to_string(),
        ));
    }
    let internal = calculate_covariance(&jacobian, redchi)?;
    let d: Array1<f64> = problem.transform_derivatives(&report.params)?;
    let n = d.len();
    Ok(Array2::from_shape_fn((n, n), |(i, j)| {
        d[i] * internal[[i, j]] * d[j]
    }))
}

/// Write standard errors onto free records, and onto every linked record
/// from the end of its chain.
fn assign_stderr(
    set: &mut ParameterSet,
    free: &[QualifiedName],
    covar: &Array2<f64>,
) -> Result<()> {
    let errors = standard_errors_from_covariance(covar);
    for (key, &stderr) in free.iter().zip(errors.iter()) {
        if let Some(record) = set.get_mut(key) {
            record.stderr = Some(stderr);
        }
    }

    let linked: Vec<QualifiedName> = set
        .iter()
        .filter(|p| p.is_linked())
        .map(|p| p.key().clone())
        .collect();
    for key in linked {
        let terminal = chain_end(set, &key)?;
        let stderr = set.get(&terminal).and_then(|p| p.stderr);
        if let Some(record) = set.get_mut(&key) {
            record.stderr = stderr;
        }
    }
    Ok(())
}

fn chain_end(set: &ParameterSet, key: &QualifiedName) -> Result<QualifiedName> {
    let mut current = key.clone();
    for _ in 0..=set.len() {
        match set.get(&current).and_then(|p| p.link()) {
            Some(target) => current = target.clone(),
            None => return Ok(current),
        }
    }
    Err(ParameterError::InvalidLink {
        name: key.to_string(),
        target: current.to_string(),
        reason: "link chain forms a cycle".to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelRegistry;
    use crate::minimizer::MinimizerOptions;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn line_data(slope: f64, intercept: f64) -> Dataset {
        let x = Array1::linspace(0.0, 10.0, 21);
        let y = x.mapv(|v| intercept + slope * v);
        Dataset::new(x, y).unwrap()
    }

    fn linear() -> Arc<Model> {
        ModelRegistry::with_builtins().resolve("linear").unwrap()
    }

    #[test]
    fn test_global_fit_recovers_exact_line() {
        let driver = FitDriver::new();
        let results = driver
            .fit(&[line_data(2.0, 1.0)], linear(), None, FitMode::Global)
            .unwrap();
        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.success());
        assert_relative_eq!(result.params.get_by_name("slope_0").unwrap().value(), 2.0, epsilon = 1e-6);
        assert_relative_eq!(result.params.get_by_name("intercept_0").unwrap().value(), 1.0, epsilon = 1e-6);
        assert_eq!(result.ndata, 21);
        assert_eq!(result.nvarys, 2);
        assert_eq!(result.method, "levenberg_marquardt");
    }

    #[test]
    fn test_caller_parameters_untouched() {
        let model = linear();
        let params = ParameterSet::create_default(&model, 1);
        let before = params.to_json().unwrap();
        FitDriver::new()
            .fit(&[line_data(3.0, -1.0)], model, Some(&params), FitMode::Global)
            .unwrap();
        assert_eq!(params.to_json().unwrap(), before);
    }

    #[test]
    fn test_all_fixed_evaluates_once() {
        let model = linear();
        let mut params = ParameterSet::create_default(&model, 1);
        params.fix(&QualifiedName::new("slope", 0), 2.0).unwrap();
        params.fix(&QualifiedName::new("intercept", 0), 0.0).unwrap();
        let result = FitDriver::new()
            .fit(&[line_data(2.0, 1.0)], model, Some(&params), FitMode::Global)
            .unwrap()
            .remove(0);
        assert!(result.success());
        assert_eq!(result.nvarys, 0);
        assert_eq!(result.nfev, 1);
        assert_relative_eq!(result.chisqr, 21.0, epsilon = 1e-12);
        assert!(result.covariance.is_none());
    }

    #[test]
    fn test_independent_cross_buffer_link_rejected() {
        let model = linear();
        let mut params = ParameterSet::create_default(&model, 2);
        params.link_names("slope_1", "slope_0").unwrap();
        let err = FitDriver::new()
            .fit(
                &[line_data(1.0, 0.0), line_data(2.0, 0.0)],
                model,
                Some(&params),
                FitMode::Independent,
            )
            .unwrap_err();
        assert!(matches!(err, SavukaError::Parameter(ParameterError::InvalidLink { .. })));
    }

    #[test]
    fn test_parameter_set_must_match_model() {
        let model = linear();
        let mut params = ParameterSet::new();
        params.add_param("slope", 0, 1.0).unwrap();
        let err = FitDriver::new()
            .fit(&[line_data(1.0, 0.0)], model, Some(&params), FitMode::Global)
            .unwrap_err();
        assert!(matches!(err, SavukaError::Parameter(ParameterError::ParameterNotFound { .. })));
    }

    #[test]
    fn test_linked_records_share_stderr() {
        let model = linear();
        let mut params = ParameterSet::create_default(&model, 2);
        params.share("slope").unwrap();
        let x = Array1::linspace(0.0, 10.0, 21);
        let noisy = |shift: f64| {
            let y = x.mapv(|v| 2.0 * v + shift + 0.01 * (v * 7.0).sin());
            Dataset::new(x.clone(), y).unwrap()
        };
        let result = FitDriver::new()
            .fit(&[noisy(0.0), noisy(5.0)], model, Some(&params), FitMode::Global)
            .unwrap()
            .remove(0);
        let s0 = result.params.get_by_name("slope_0").unwrap().stderr.unwrap();
        let s1 = result.params.get_by_name("slope_1").unwrap().stderr.unwrap();
        assert!(s0 > 0.0);
        assert_eq!(s0, s1);
        assert_eq!(result.var_names.len(), 3);
    }

    #[test]
    fn test_invalid_options_rejected_before_fitting() {
        let config = FitConfig::default()
            .with_minimizer(MinimizerOptions::default().with_max_evaluations(0));
        let driver = FitDriver::new().with_config(config);
        assert!(driver
            .fit(&[line_data(1.0, 0.0)], linear(), None, FitMode::Global)
            .is_err());
    }

    #[test]
    fn test_cancelled_driver_refuses_work() {
        let driver = FitDriver::new();
        driver.cancel_token().cancel();
        assert!(matches!(
            driver.fit(&[line_data(1.0, 0.0)], linear(), None, FitMode::Global),
            Err(SavukaError::Cancelled)
        ));
        driver.cancel_token().reset();
        assert!(driver
            .fit(&[line_data(1.0, 0.0)], linear(), None, FitMode::Global)
            .is_ok());
    }

    #[test]
    fn test_replay_matches_original() {
        let driver = FitDriver::new();
        let result = driver
            .fit(&[line_data(-0.5, 4.0)], linear(), None, FitMode::Global)
            .unwrap()
            .remove(0);
        let again = driver.replay(&result).unwrap();
        assert_relative_eq!(again.chisqr, result.chisqr, epsilon = 1e-12);
        assert_eq!(again.nfev, result.nfev);
    }
}

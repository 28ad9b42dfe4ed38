//! Problem definition trait and the parameter-set adapter.
//!
//! The minimizer only sees a [`Problem`]: a residual vector over a flat array
//! of unconstrained values. [`ParameterProblem`] maps that array onto the
//! free records of a [`ParameterSet`] and evaluates the residual engine.

use ndarray::{Array1, Array2};

use crate::error::{Result, SavukaError};
use crate::minimizer::NanPolicy;
use crate::models::Model;
use crate::parameters::{Parameter, ParameterError, ParameterSet, QualifiedName};
use crate::residual::{residuals, FitData};
use crate::utils::finite_difference;

/// A nonlinear least squares problem.
pub trait Problem {
    /// Evaluate the residuals at the given parameters.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Get the number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Get the number of residuals in the problem.
    fn residual_count(&self) -> usize;

    /// Jacobian of the residuals, by forward differences unless overridden.
    ///
    /// `residuals` may carry `eval(params)` to save one evaluation.
    fn jacobian(
        &self,
        params: &Array1<f64>,
        residuals: Option<&Array1<f64>>,
        epsilon: Option<f64>,
    ) -> Result<Array2<f64>> {
        finite_difference::jacobian(|p| self.eval(p), params, residuals, epsilon)
    }

    /// Sum of squared residuals.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }

    /// Human-readable rendering of `params` for debug traces.
    fn trace(&self, params: &Array1<f64>) -> String {
        format!("{params}")
    }
}

/// Residual problem over the free records of a parameter set.
///
/// Free records (`vary` and not linked) are exposed to the minimizer in set
/// order, each through its bounds transform. Every evaluation works on a
/// private copy of the template set, so the caller's set is never touched.
pub struct ParameterProblem<'a> {
    template: &'a ParameterSet,
    data: &'a FitData,
    model: &'a Model,
    free: Vec<QualifiedName>,
    nan_policy: NanPolicy,
}

impl<'a> ParameterProblem<'a> {
    pub fn new(
        template: &'a ParameterSet,
        data: &'a FitData,
        model: &'a Model,
        nan_policy: NanPolicy,
    ) -> Self {
        Self {
            template,
            data,
            model,
            free: template.free_keys(),
            nan_policy,
        }
    }

    /// Keys of the records the minimizer adjusts, in array order.
    pub fn free_keys(&self) -> &[QualifiedName] {
        &self.free
    }

    /// Starting point in internal coordinates.
    pub fn initial_internal(&self) -> Result<Array1<f64>> {
        self.free
            .iter()
            .map(|key| Ok(self.record(key)?.to_internal()?))
            .collect()
    }

    fn record(&self, key: &QualifiedName) -> Result<&Parameter> {
        self.template.get(key).ok_or_else(|| {
            SavukaError::Parameter(ParameterError::ParameterNotFound {
                name: key.to_string(),
            })
        })
    }

    /// External (bounded) values of the free records.
    pub fn external_values(&self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_len(internal)?;
        self.free
            .iter()
            .zip(internal.iter())
            .map(|(key, &v)| Ok(self.record(key)?.from_internal(v)))
            .collect()
    }

    /// `d external / d internal` for every free record.
    pub fn transform_derivatives(&self, internal: &Array1<f64>) -> Result<Array1<f64>> {
        self.check_len(internal)?;
        self.free
            .iter()
            .zip(internal.iter())
            .map(|(key, &v)| Ok(self.record(key)?.bounds_transform().derivative(v)))
            .collect()
    }

    /// Copy of the template with free records set from `internal` and links
    /// re-synchronised.
    pub fn apply(&self, internal: &Array1<f64>) -> Result<ParameterSet> {
        self.check_len(internal)?;
        let mut set = self.template.deep_copy();
        for (key, &v) in self.free.iter().zip(internal.iter()) {
            let record = set.get_mut(key).ok_or_else(|| {
                SavukaError::Parameter(ParameterError::ParameterNotFound {
                    name: key.to_string(),
                })
            })?;
            let value = record.from_internal(v);
            record.assign(value);
        }
        set.sync_links()?;
        Ok(set)
    }

    fn check_len(&self, internal: &Array1<f64>) -> Result<()> {
        if internal.len() != self.free.len() {
            return Err(SavukaError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.free.len(),
                internal.len()
            )));
        }
        Ok(())
    }
}

impl Problem for ParameterProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let set = self.apply(params)?;
        let mut r = residuals(&set, self.data, self.model)?;
        self.nan_policy.apply(&mut r)?;
        Ok(r)
    }

    fn parameter_count(&self) -> usize {
        self.free.len()
    }

    fn residual_count(&self) -> usize {
        self.data.ndata()
    }

    fn trace(&self, params: &Array1<f64>) -> String {
        match self.external_values(params) {
            Ok(values) => self
                .free
                .iter()
                .zip(values.iter())
                .map(|(key, v)| format!("{key}={v:.6e}"))
                .collect::<Vec<_>>()
                .join(", "),
            Err(_) => format!("{params}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::models::ModelRegistry;
    use crate::residual::ResamplePolicy;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn setup() -> (ParameterSet, FitData, std::sync::Arc<Model>) {
        let model = ModelRegistry::with_builtins().resolve("linear").unwrap();
        let mut params = ParameterSet::create_default(&model, 2);
        params.link_names("slope_1", "slope_0").unwrap();
        params
            .get_mut(&QualifiedName::new("intercept", 1))
            .unwrap()
            .set_bounds(0.0, 10.0)
            .unwrap();
        let datasets = vec![
            Dataset::from_pairs(&[(0.0, 1.0), (1.0, 3.0)]),
            Dataset::from_pairs(&[(0.0, 2.0), (1.0, 4.0)]),
        ];
        let data = FitData::from_datasets(&datasets, ResamplePolicy::Resample).unwrap();
        (params, data, model)
    }

    #[test]
    fn test_free_records_exclude_linked() {
        let (params, data, model) = setup();
        let problem = ParameterProblem::new(&params, &data, &model, NanPolicy::Raise);
        let names: Vec<String> = problem.free_keys().iter().map(ToString::to_string).collect();
        assert_eq!(names, ["intercept_0", "slope_0", "intercept_1"]);
        assert_eq!(problem.parameter_count(), 3);
        assert_eq!(problem.residual_count(), 4);
    }

    #[test]
    fn test_eval_at_true_values_is_zero() {
        let (params, data, model) = setup();
        let problem = ParameterProblem::new(&params, &data, &model, NanPolicy::Raise);
        let internal = array![
            1.0,
            2.0,
            params
                .get(&QualifiedName::new("intercept", 1))
                .unwrap()
                .bounds_transform()
                .to_internal(2.0)
                .unwrap()
        ];
        let r = problem.eval(&internal).unwrap();
        for v in r.iter() {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-12);
        }
        // template untouched
        assert_eq!(params.get(&QualifiedName::new("slope", 0)).unwrap().value(), 1.0);
    }

    #[test]
    fn test_apply_syncs_links() {
        let (params, data, model) = setup();
        let problem = ParameterProblem::new(&params, &data, &model, NanPolicy::Raise);
        let set = problem.apply(&array![0.0, 5.0, 0.0]).unwrap();
        assert_eq!(set.get(&QualifiedName::new("slope", 1)).unwrap().value(), 5.0);
        assert!(problem.apply(&array![0.0]).is_err());
    }

    #[test]
    fn test_trace_uses_external_values() {
        let (params, data, model) = setup();
        let problem = ParameterProblem::new(&params, &data, &model, NanPolicy::Raise);
        let trace = problem.trace(&array![1.0, 2.0, 0.0]);
        assert!(trace.starts_with("intercept_0=1.000000e0, slope_0=2.000000e0"));
        assert!(trace.contains("intercept_1=5.000000e0"));
    }
}

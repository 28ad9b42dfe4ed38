//! Integration tests for the Levenberg-Marquardt minimizer on hand-written problems.

use approx::assert_relative_eq;
use ndarray::{array, Array1, Array2};
use savuka::lm::{LevenbergMarquardt, LmConfig};
use savuka::{Minimizer, MinimizerOptions, NanPolicy, Problem, Result, SavukaError};

/// Test Problem: Simple 1D linear function f(x) = a*x + b
struct LinearProblem {
    x_data: Array1<f64>,
    y_data: Array1<f64>,
}

impl Problem for LinearProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        if params.len() != 2 {
            return Err(SavukaError::DimensionMismatch(format!(
                "Expected 2 parameters, got {}",
                params.len()
            )));
        }
        let (a, b) = (params[0], params[1]);
        Ok(self
            .x_data
            .iter()
            .zip(self.y_data.iter())
            .map(|(x, y)| y - (a * x + b))
            .collect())
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        self.x_data.len()
    }

    fn jacobian(
        &self,
        _params: &Array1<f64>,
        _residuals: Option<&Array1<f64>>,
        _epsilon: Option<f64>,
    ) -> Result<Array2<f64>> {
        let n = self.x_data.len();
        let mut jac = Array2::zeros((n, 2));
        for i in 0..n {
            jac[[i, 0]] = -self.x_data[i]; // d/da
            jac[[i, 1]] = -1.0; // d/db
        }
        Ok(jac)
    }
}

/// Rosenbrock as residuals: r1 = 1 - x, r2 = 10(y - x²)
struct RosenbrockProblem;

impl Problem for RosenbrockProblem {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let (x, y) = (params[0], params[1]);
        Ok(array![1.0 - x, 10.0 * (y - x * x)])
    }

    fn parameter_count(&self) -> usize {
        2
    }

    fn residual_count(&self) -> usize {
        2
    }
}

/// Returns NaN residuals whenever the first parameter is negative.
struct HalfDefined;

impl Problem for HalfDefined {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let x = params[0];
        let r = if x < 0.0 { f64::NAN } else { x.sqrt() - 1.5 };
        let mut residuals = array![r, r];
        NanPolicy::Propagate.apply(&mut residuals)?;
        Ok(residuals)
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn residual_count(&self) -> usize {
        2
    }
}

#[test]
fn test_linear_problem_analytic_jacobian() {
    let x_data = Array1::linspace(0.0, 9.0, 10);
    let y_data = x_data.mapv(|x| 2.0 * x + 1.0);
    let problem = LinearProblem { x_data, y_data };

    let report = LevenbergMarquardt::new()
        .minimize(&problem, array![0.0, 0.0], &MinimizerOptions::default())
        .unwrap();

    assert!(report.success, "{}", report.message);
    assert_relative_eq!(report.params[0], 2.0, epsilon = 1e-8);
    assert_relative_eq!(report.params[1], 1.0, epsilon = 1e-8);
    assert!(report.cost < 1e-16);
}

#[test]
fn test_rosenbrock_from_standard_start() {
    let report = LevenbergMarquardt::new()
        .minimize(&RosenbrockProblem, array![-1.2, 1.0], &MinimizerOptions::default())
        .unwrap();

    assert!(report.success, "{}", report.message);
    assert_relative_eq!(report.params[0], 1.0, epsilon = 1e-4);
    assert_relative_eq!(report.params[1], 1.0, epsilon = 1e-4);
}

#[test]
fn test_custom_damping_configuration() {
    let config = LmConfig {
        initial_lambda: 10.0,
        lambda_up_factor: 4.0,
        lambda_down_factor: 0.5,
        ..LmConfig::default()
    };
    let report = LevenbergMarquardt::with_config(config)
        .minimize(&RosenbrockProblem, array![-1.2, 1.0], &MinimizerOptions::default())
        .unwrap();
    assert_relative_eq!(report.params[0], 1.0, epsilon = 1e-4);
}

#[test]
fn test_undefined_region_is_avoided() {
    let report = LevenbergMarquardt::new()
        .minimize(&HalfDefined, array![0.5], &MinimizerOptions::default())
        .unwrap();
    assert!(report.success, "{}", report.message);
    assert_relative_eq!(report.params[0], 2.25, epsilon = 1e-6);
}

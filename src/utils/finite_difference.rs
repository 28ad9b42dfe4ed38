//! Finite difference methods for numerical differentiation.
//!
//! Model functions are black boxes, so every Jacobian in the crate is
//! estimated with forward differences.

use ndarray::{Array1, Array2};

use crate::error::{Result, SavukaError};

/// Default relative step size for finite differences.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Compute the Jacobian matrix using forward finite differences.
///
/// J[i,j] = ∂r[i]/∂p[j], with the step for parameter `j` scaled to its
/// magnitude (`|p_j|·eps`, or `eps` for parameters near zero).
///
/// # Arguments
///
/// * `f` - Residual function
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `residuals` - `f(params)` when the caller already has it
/// * `epsilon` - The relative step size (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix, one row per residual
pub fn jacobian<F>(
    f: F,
    params: &Array1<f64>,
    residuals: Option<&Array1<f64>>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<Array1<f64>>,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let base = match residuals {
        Some(r) => r.clone(),
        None => f(params)?,
    };
    let n_residuals = base.len();

    let mut jac = Array2::zeros((n_residuals, params.len()));
    let mut perturbed = params.clone();

    for j in 0..params.len() {
        let param_j = params[j];
        let eps_j = if param_j.abs() > eps {
            param_j.abs() * eps
        } else {
            eps
        };

        perturbed[j] = param_j + eps_j;
        let shifted = f(&perturbed)?;
        perturbed[j] = param_j;

        if shifted.len() != n_residuals {
            return Err(SavukaError::DimensionMismatch(format!(
                "Expected {} residuals, got {}",
                n_residuals,
                shifted.len()
            )));
        }

        let mut column = jac.column_mut(j);
        for i in 0..n_residuals {
            column[i] = (shifted[i] - base[i]) / eps_j;
        }
    }

    Ok(jac)
}

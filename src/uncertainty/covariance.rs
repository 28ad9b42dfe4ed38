//! # Covariance Matrix Calculations

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};

use crate::error::{Result, SavukaError};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};

/// Calculate covariance matrix from Jacobian matrix.
///
/// For nonlinear least-squares problems, the covariance matrix is estimated as:
///   covar = redchi * inv(J^T * J)
/// where J is the Jacobian at the solution and redchi the reduced chi-square.
///
/// Fails with [`SavukaError::LinearAlgebra`] when `JᵀJ` is singular, which
/// happens when a free parameter has no influence on the residuals.
pub fn calculate_covariance(jacobian: &Array2<f64>, redchi: f64) -> Result<Array2<f64>> {
    let j = ndarray_to_nalgebra(jacobian);
    let jtj: DMatrix<f64> = j.transpose() * &j;

    let inverse = match jtj.clone().cholesky() {
        Some(cholesky) => cholesky.inverse(),
        None => jtj.try_inverse().ok_or_else(|| {
            SavukaError::LinearAlgebra("J^T J is singular; covariance is undefined".to_string())
        })?,
    };
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(SavukaError::LinearAlgebra(
            "covariance contains non-finite values".to_string(),
        ));
    }

    Ok(nalgebra_to_ndarray(&(inverse * redchi)))
}

/// Calculate correlation matrix from covariance matrix.
///
/// correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Standard errors: square roots of the covariance diagonal.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

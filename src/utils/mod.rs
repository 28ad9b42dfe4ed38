//! Numerical helpers shared by the residual engine and the minimizer.

pub mod finite_difference;
pub mod interpolate;
pub mod matrix_convert;

// Re-export commonly used utilities
pub use finite_difference::jacobian;
pub use interpolate::interp;
pub use matrix_convert::{
    nalgebra_to_ndarray, nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};

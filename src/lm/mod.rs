//! Levenberg-Marquardt algorithm implementation.
//!
//! The built-in [`Minimizer`](crate::minimizer::Minimizer): damped
//! Gauss-Newton steps on a finite-difference Jacobian with Marquardt
//! diagonal scaling.

pub mod algorithm;
pub mod config;

// Re-export key types
pub use algorithm::LevenbergMarquardt;
pub use config::LmConfig;

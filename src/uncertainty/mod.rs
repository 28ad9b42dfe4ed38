//! # Uncertainty Calculation
//!
//! Parameter uncertainties at a fitted solution, estimated the way lmfit does:
//! the covariance is `redchi · inv(JᵀJ)` with the Jacobian taken with respect
//! to the free parameters' external values.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, standard_errors_from_covariance,
};

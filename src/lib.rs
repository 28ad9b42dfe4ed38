//! # savuka
//!
//! `savuka` fits parameterised models to one or more measured datasets
//! ("buffers") at once.
//!
//! The library provides:
//! - A model registry with built-in linear, Gaussian and two-state chemical
//!   denaturation models
//! - Parameter sets keyed by `(name, buffer)` with bounds, fixed values and
//!   cross-buffer links for global fits
//! - A Levenberg-Marquardt minimizer behind a pluggable [`Minimizer`] trait
//! - Global and independent fits with covariance-based uncertainties
//! - Error-landscape analysis of a single parameter
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::Array1;
//! use savuka::{Dataset, FitMode, Session};
//!
//! let x = Array1::linspace(0.0, 10.0, 21);
//! let mut session = Session::new();
//! session.add_buffer(Dataset::new(x.clone(), x.mapv(|v| 2.0 * v + 1.0)).unwrap());
//! session.add_buffer(Dataset::new(x.clone(), x.mapv(|v| 2.0 * v - 3.0)).unwrap());
//!
//! // one slope for both buffers, one intercept per buffer
//! let mut params = session.default_parameters("linear", 2).unwrap();
//! params.link_names("slope_1", "slope_0").unwrap();
//!
//! let result = session
//!     .fit(&[0, 1], "linear", FitMode::Global, Some(&params))
//!     .unwrap()
//!     .remove(0);
//! assert!(result.success());
//! assert!((result.params.get_by_name("slope_1").unwrap().value() - 2.0).abs() < 1e-6);
//! assert!((result.params.get_by_name("intercept_1").unwrap().value() + 3.0).abs() < 1e-6);
//! ```

pub mod dataset;
pub mod error;
pub mod fit;
pub mod formats;
pub mod lm;
pub mod minimizer;
pub mod models;
pub mod parameters;
pub mod problem;
pub mod residual;
pub mod session;
pub mod synthetic;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use dataset::{Axis, Dataset};
pub use error::{Result, SavukaError};
pub use fit::{
    CancellationToken, ErrorLandscape, FitConfig, FitDriver, FitMode, FitResult, FitState,
    LandscapeConfig,
};
pub use formats::{DatasetReader, FormatRegistry};
pub use lm::LevenbergMarquardt;
pub use minimizer::{Method, Minimizer, MinimizerOptions, NanPolicy};
pub use models::{Model, ModelRegistry};
pub use parameters::{Bounds, Parameter, ParameterSet, QualifiedName};
pub use problem::Problem;
pub use residual::{FitData, ResamplePolicy};
pub use session::Session;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

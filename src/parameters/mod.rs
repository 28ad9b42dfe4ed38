//! # Parameter System
//!
//! Per-buffer parameter records for multi-buffer fits.
//!
//! Every model parameter is instantiated once per fitted buffer and keyed by
//! a [`QualifiedName`] `(base, buffer)`, rendered as `base_buffer`. Records can
//! vary, be held fixed, carry bounds, or be linked to another record so that
//! buffers share one fitted value (a global fit).
//!
//! ## Core Components
//!
//! - [`Parameter`]: one record with value, vary flag, bounds and optional link
//! - [`ParameterSet`]: ordered collection with link validation and JSON exchange
//! - [`Bounds`] and [`BoundsTransform`]: bounds handling during optimization
//!
//! ## Example Usage
//!
//! ```rust
//! use savuka::parameters::{ParameterSet, QualifiedName};
//!
//! let mut params = ParameterSet::new();
//! params.add_param("slope", 0, 2.0).unwrap();
//! params.add_param("slope", 1, 2.5).unwrap();
//!
//! // Buffer 1 shares buffer 0's slope
//! params.link_names("slope_1", "slope_0").unwrap();
//! assert!(params.is_global());
//! assert_eq!(params.effective_value(&QualifiedName::new("slope", 1)).unwrap(), 2.0);
//! ```

pub mod bounds;
pub mod name;
pub mod parameter;
pub mod parameters;

// Re-export key types
pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use name::QualifiedName;
pub use parameter::{Parameter, ParameterError};
pub use parameters::ParameterSet;

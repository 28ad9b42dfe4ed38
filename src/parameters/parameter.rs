//! Parameter record definition
//!
//! A [`Parameter`] is one model parameter instantiated for one buffer. It can
//! be varied during optimization, held inside bounds, or linked to another
//! record so that it follows that record's value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::parameters::bounds::{Bounds, BoundsError, BoundsTransform};
use crate::parameters::name::QualifiedName;

/// Errors that can occur when working with parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("Invalid link from '{name}' to '{target}': {reason}")]
    InvalidLink {
        name: String,
        target: String,
        reason: String,
    },

    #[error("Parameter '{name}' not found")]
    ParameterNotFound { name: String },

    #[error("Parameter '{name}' already exists")]
    DuplicateParameter { name: String },

    #[error("Invalid parameter name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Bounds error: {0}")]
    Bounds(#[from] BoundsError),
}

/// One per-buffer parameter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    key: QualifiedName,

    value: f64,

    /// Value the record was created with (for reset operations)
    init_value: f64,

    /// Whether the minimizer may change this record
    pub vary: bool,

    #[serde(default)]
    bounds: Bounds,

    /// Record whose value this one follows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    link: Option<QualifiedName>,

    /// Standard error of the parameter (set after fitting)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<f64>,
}

impl Parameter {
    /// Create a varying, unbounded, unlinked record.
    ///
    /// ```
    /// use savuka::parameters::{Parameter, QualifiedName};
    ///
    /// let p = Parameter::new(QualifiedName::new("slope", 0), 2.0);
    /// assert_eq!(p.name(), "slope_0");
    /// assert!(p.vary);
    /// assert!(!p.is_linked());
    /// ```
    pub fn new(key: QualifiedName, value: f64) -> Self {
        Self {
            key,
            value,
            init_value: value,
            vary: true,
            bounds: Bounds::unbounded(),
            link: None,
            stderr: None,
        }
    }

    /// Create a record constrained to `[min, max]`.
    pub fn with_bounds(
        key: QualifiedName,
        value: f64,
        min: f64,
        max: f64,
    ) -> Result<Self, ParameterError> {
        let mut param = Self::new(key, value);
        param.set_bounds(min, max)?;
        Ok(param)
    }

    pub fn key(&self) -> &QualifiedName {
        &self.key
    }

    /// Qualified name in its `base_index` form.
    pub fn name(&self) -> String {
        self.key.to_string()
    }

    pub fn base(&self) -> &str {
        self.key.base()
    }

    pub fn buffer(&self) -> usize {
        self.key.buffer()
    }

    /// The record's own value. Linked records report their effective value
    /// through [`ParameterSet::effective_value`](crate::parameters::ParameterSet::effective_value).
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Set the value, rejecting non-finite numbers and values outside the bounds.
    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !value.is_finite() {
            return Err(BoundsError::NonFiniteValue.into());
        }
        if !self.bounds.contains(value) {
            return Err(BoundsError::ValueOutsideBounds {
                value,
                min: self.bounds.min,
                max: self.bounds.max,
            }
            .into());
        }
        self.value = value;
        Ok(())
    }

    /// Hold the record at `value` for subsequent fits.
    pub fn fix(&mut self, value: f64) -> Result<(), ParameterError> {
        self.set_value(value)?;
        self.vary = false;
        Ok(())
    }

    pub fn init_value(&self) -> f64 {
        self.init_value
    }

    /// Restore the creation value and clear any fitted standard error.
    pub fn reset(&mut self) {
        self.value = self.bounds.clamp(self.init_value);
        self.stderr = None;
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn min(&self) -> f64 {
        self.bounds.min
    }

    pub fn max(&self) -> f64 {
        self.bounds.max
    }

    /// Set new bounds; the current value is clamped into them.
    pub fn set_bounds(&mut self, min: f64, max: f64) -> Result<(), ParameterError> {
        self.bounds = Bounds::new(min, max)?;
        self.value = self.bounds.clamp(self.value);
        Ok(())
    }

    pub fn link(&self) -> Option<&QualifiedName> {
        self.link.as_ref()
    }

    pub fn is_linked(&self) -> bool {
        self.link.is_some()
    }

    /// Raw link assignment. Target existence and cycles are checked by the
    /// owning set.
    pub(crate) fn set_link(&mut self, target: Option<QualifiedName>) {
        self.link = target;
    }

    pub(crate) fn rekey(&mut self, key: QualifiedName) {
        self.key = key;
    }

    /// Record is adjusted by the minimizer: varying and not following a link.
    pub fn is_free(&self) -> bool {
        self.vary && self.link.is_none()
    }

    pub fn bounds_transform(&self) -> BoundsTransform {
        BoundsTransform::new(self.bounds)
    }

    /// Current value in the minimizer's unconstrained coordinate.
    pub fn to_internal(&self) -> Result<f64, ParameterError> {
        Ok(self.bounds_transform().to_internal(self.value)?)
    }

    /// Map an internal coordinate back to a bounded value.
    pub fn from_internal(&self, internal: f64) -> f64 {
        self.bounds_transform().to_external(internal)
    }

    /// Overwrite the value without bounds checking; `value` comes from
    /// [`from_internal`](Self::from_internal) and is already inside the bounds.
    pub(crate) fn assign(&mut self, value: f64) {
        self.value = value;
    }
}

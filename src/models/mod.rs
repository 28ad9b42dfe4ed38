//! Model registry.
//!
//! A [`Model`] is a pure function of an x-array and a fixed list of named
//! scalar parameters. The [`ModelRegistry`] maps canonical names and aliases
//! to models; it is populated at startup and resolved by name at fit time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ndarray::Array1;

use crate::error::{Result, SavukaError};
use crate::parameters::name::is_valid_base;

mod builtin;

pub use builtin::{gaussian_1d, linear, two_state, GAS_CONSTANT_KCAL};

/// Signature shared by every model function: `f(x, values) -> y`, where
/// `values` follows the model's declared parameter order.
pub type ModelFn = dyn Fn(&Array1<f64>, &[f64]) -> Array1<f64> + Send + Sync;

/// A named model function with its declared parameters and defaults.
#[derive(Clone)]
pub struct Model {
    name: String,
    aliases: Vec<String>,
    defaults: Vec<(String, f64)>,
    parameter_names: Vec<String>,
    description: String,
    func: Arc<ModelFn>,
}

impl Model {
    /// Create a model from its function and `(parameter, default)` pairs.
    pub fn new<F>(name: &str, defaults: &[(&str, f64)], func: F) -> Self
    where
        F: Fn(&Array1<f64>, &[f64]) -> Array1<f64> + Send + Sync + 'static,
    {
        let defaults: Vec<(String, f64)> = defaults
            .iter()
            .map(|(param, value)| (param.to_string(), *value))
            .collect();
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            parameter_names: defaults.iter().map(|(param, _)| param.clone()).collect(),
            defaults,
            description: String::new(),
            func: Arc::new(func),
        }
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Declared `(parameter, default)` pairs in signature order.
    pub fn defaults(&self) -> &[(String, f64)] {
        &self.defaults
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameter_names.iter().any(|p| p == name)
    }

    /// Evaluate the model at `x` with values in declared parameter order.
    pub fn eval(&self, x: &Array1<f64>, values: &[f64]) -> Result<Array1<f64>> {
        if values.len() != self.parameter_names.len() {
            return Err(SavukaError::DimensionMismatch(format!(
                "model '{}' takes {} parameters, got {}",
                self.name,
                self.parameter_names.len(),
                values.len()
            )));
        }
        Ok((self.func)(x, values))
    }

    /// Evaluate at the declared defaults.
    pub fn eval_defaults(&self, x: &Array1<f64>) -> Array1<f64> {
        let values: Vec<f64> = self.defaults.iter().map(|(_, v)| *v).collect();
        (self.func)(x, &values)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

/// Name/alias to model mapping.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<Model>>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the linear, Gaussian and two-state denaturation models.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for model in builtin::builtin_models() {
            if let Err(err) = registry.register(model) {
                log::error!("failed to register built-in model: {err}");
            }
        }
        registry
    }

    /// Add a model.
    ///
    /// Fails with [`SavukaError::DuplicateModel`] when the canonical name or an
    /// alias is already taken, and with [`SavukaError::InvalidInput`] when a
    /// parameter name cannot form a qualified name.
    pub fn register(&mut self, model: Model) -> Result<()> {
        let keys = std::iter::once(model.name()).chain(model.aliases().iter().map(String::as_str));
        for key in keys {
            if self.find(&normalize(key)).is_some() {
                return Err(SavukaError::DuplicateModel(key.to_string()));
            }
        }
        if let Some(bad) = model.parameter_names().iter().find(|p| !is_valid_base(p)) {
            return Err(SavukaError::InvalidInput(format!(
                "model '{}' declares parameter '{}', which is not an identifier",
                model.name(),
                bad
            )));
        }
        self.models.insert(model.name().to_string(), Arc::new(model));
        Ok(())
    }

    fn find(&self, key: &str) -> Option<&Arc<Model>> {
        self.models.values().find(|m| {
            normalize(m.name()) == key || m.aliases().iter().any(|a| normalize(a) == key)
        })
    }

    /// Look a model up by canonical name or alias (case-insensitive).
    pub fn resolve(&self, name: &str) -> Result<Arc<Model>> {
        self.find(&normalize(name))
            .cloned()
            .ok_or_else(|| SavukaError::UnknownModel {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Default parameter values of a registered model.
    pub fn defaults(&self, name: &str) -> Result<BTreeMap<String, f64>> {
        Ok(self.resolve(name)?.defaults().iter().cloned().collect())
    }

    /// Canonical names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.models.keys().cloned().collect()
    }

    /// Help text for a model: description, aliases and defaults.
    pub fn describe(&self, name: &str) -> Result<String> {
        let model = self.resolve(name)?;
        let defaults: Vec<String> = model
            .defaults()
            .iter()
            .map(|(p, v)| format!("{p}={v}"))
            .collect();
        Ok(format!(
            "{} (aliases: {})\n  {}\n  defaults: {}",
            model.name(),
            model.aliases().join(", "),
            model.description(),
            defaults.join(", ")
        ))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(&normalize(name)).is_some()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

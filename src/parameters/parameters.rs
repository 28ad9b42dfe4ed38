//! Ordered parameter set
//!
//! [`ParameterSet`] holds the per-buffer records of one fit configuration in
//! insertion order, keyed by [`QualifiedName`]. Links between records are
//! validated when they are made, so reading an effective value never has to
//! detect cycles.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::Model;
use crate::parameters::name::QualifiedName;
use crate::parameters::parameter::{Parameter, ParameterError};

/// A collection of per-buffer parameter records.
///
/// Cloning produces a fully independent copy; see [`deep_copy`](Self::deep_copy).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Parameter>", into = "Vec<Parameter>")]
pub struct ParameterSet {
    records: Vec<Parameter>,
    index: HashMap<QualifiedName, usize>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One record per model parameter per buffer, seeded with the model
    /// defaults, varying and unbounded.
    ///
    /// Records are ordered buffer by buffer, following the model's declared
    /// parameter order within each buffer.
    ///
    /// ```
    /// use savuka::models::ModelRegistry;
    /// use savuka::parameters::{ParameterSet, QualifiedName};
    ///
    /// let registry = ModelRegistry::with_builtins();
    /// let line = registry.resolve("line").unwrap();
    /// let params = ParameterSet::create_default(&line, 2);
    /// assert_eq!(params.len(), 4);
    /// assert_eq!(params.get(&QualifiedName::new("slope", 1)).unwrap().value(), 1.0);
    /// assert!(!params.is_global());
    /// ```
    pub fn create_default(model: &Model, buffer_count: usize) -> Self {
        let mut set = Self::new();
        for buffer in 0..buffer_count {
            for (name, value) in model.defaults() {
                set.push(Parameter::new(QualifiedName::new(name.clone(), buffer), *value));
            }
        }
        set
    }

    fn push(&mut self, param: Parameter) {
        self.index.insert(param.key().clone(), self.records.len());
        self.records.push(param);
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .records
            .iter()
            .enumerate()
            .map(|(i, p)| (p.key().clone(), i))
            .collect();
    }

    /// Add a record. Qualified names must be unique.
    pub fn add(&mut self, param: Parameter) -> std::result::Result<(), ParameterError> {
        if self.index.contains_key(param.key()) {
            return Err(ParameterError::DuplicateParameter { name: param.name() });
        }
        self.push(param);
        Ok(())
    }

    /// Add a varying, unbounded record.
    pub fn add_param(
        &mut self,
        base: &str,
        buffer: usize,
        value: f64,
    ) -> std::result::Result<(), ParameterError> {
        self.add(Parameter::new(QualifiedName::new(base, buffer), value))
    }

    pub fn get(&self, key: &QualifiedName) -> Option<&Parameter> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, key: &QualifiedName) -> Option<&mut Parameter> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.records[i]),
            None => None,
        }
    }

    /// Look up a record by its `base_index` text.
    pub fn get_by_name(&self, name: &str) -> std::result::Result<&Parameter, ParameterError> {
        let key = QualifiedName::parse(name)?;
        self.require(&key)
    }

    fn require(&self, key: &QualifiedName) -> std::result::Result<&Parameter, ParameterError> {
        self.get(key).ok_or_else(|| ParameterError::ParameterNotFound {
            name: key.to_string(),
        })
    }

    fn require_mut(
        &mut self,
        key: &QualifiedName,
    ) -> std::result::Result<&mut Parameter, ParameterError> {
        let name = key.to_string();
        self.get_mut(key)
            .ok_or(ParameterError::ParameterNotFound { name })
    }

    pub fn contains(&self, key: &QualifiedName) -> bool {
        self.index.contains_key(key)
    }

    /// Remove a record. Records that other records link to cannot be removed.
    pub fn remove(&mut self, key: &QualifiedName) -> std::result::Result<Parameter, ParameterError> {
        self.require(key)?;
        if let Some(dependent) = self.records.iter().find(|p| p.link() == Some(key)) {
            return Err(ParameterError::InvalidLink {
                name: dependent.name(),
                target: key.to_string(),
                reason: "target cannot be removed while linked".to_string(),
            });
        }
        let position = self.index[key];
        let removed = self.records.remove(position);
        self.rebuild_index();
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.records.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &QualifiedName> {
        self.records.iter().map(Parameter::key)
    }

    /// Distinct buffer indices, ascending.
    pub fn buffers(&self) -> Vec<usize> {
        self.records
            .iter()
            .map(Parameter::buffer)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Records belonging to exactly `buffer`.
    pub fn records_for_buffer(&self, buffer: usize) -> impl Iterator<Item = &Parameter> {
        self.records.iter().filter(move |p| p.buffer() == buffer)
    }

    /// Records sharing the base name `base`, in insertion order.
    pub fn records_for_base<'a>(&'a self, base: &'a str) -> impl Iterator<Item = &'a Parameter> + 'a {
        self.records.iter().filter(move |p| p.base() == base)
    }

    /// Make `name` follow `target`.
    ///
    /// Fails with [`ParameterError::InvalidLink`] when the target does not
    /// exist, when linking a record to itself, or when the link would close a
    /// cycle.
    pub fn link(
        &mut self,
        name: &QualifiedName,
        target: &QualifiedName,
    ) -> std::result::Result<(), ParameterError> {
        self.require(name)?;
        let invalid = |reason: &str| ParameterError::InvalidLink {
            name: name.to_string(),
            target: target.to_string(),
            reason: reason.to_string(),
        };

        if !self.contains(target) {
            return Err(invalid("target does not exist"));
        }
        if name == target {
            return Err(invalid("a record cannot link to itself"));
        }

        // Walk the target's chain; reaching `name` means the new edge closes a loop.
        let mut current = target;
        while let Some(next) = self.get(current).and_then(Parameter::link) {
            if next == name {
                return Err(invalid("link would create a cycle"));
            }
            current = next;
        }

        let value = self.effective_value(target)?;
        let record = self.require_mut(name)?;
        record.set_link(Some(target.clone()));
        record.assign(value);
        Ok(())
    }

    /// Text form of [`link`](Self::link), e.g. `link_names("slope_1", "slope_0")`.
    pub fn link_names(&mut self, name: &str, target: &str) -> std::result::Result<(), ParameterError> {
        let name = QualifiedName::parse(name)?;
        let target = QualifiedName::parse(target).map_err(|_| ParameterError::InvalidLink {
            name: name.to_string(),
            target: target.to_string(),
            reason: "target is not a qualified parameter name".to_string(),
        })?;
        self.link(&name, &target)
    }

    pub fn unlink(&mut self, name: &QualifiedName) -> std::result::Result<(), ParameterError> {
        self.require_mut(name)?.set_link(None);
        Ok(())
    }

    /// Link every record named `base` to the one with the lowest buffer index.
    pub fn share(&mut self, base: &str) -> std::result::Result<(), ParameterError> {
        let mut keys: Vec<QualifiedName> = self.records_for_base(base).map(|p| p.key().clone()).collect();
        keys.sort();
        let Some((anchor, rest)) = keys.split_first() else {
            return Err(ParameterError::ParameterNotFound {
                name: base.to_string(),
            });
        };
        for key in rest {
            self.link(key, anchor)?;
        }
        Ok(())
    }

    /// True when at least one record follows another.
    pub fn is_global(&self) -> bool {
        self.records.iter().any(Parameter::is_linked)
    }

    /// Value of the terminal unlinked record reached from `key`.
    pub fn effective_value(&self, key: &QualifiedName) -> std::result::Result<f64, ParameterError> {
        let mut record = self.require(key)?;
        // Chains are acyclic by construction; the step cap guards hand-edited sets.
        for _ in 0..self.records.len() {
            match record.link() {
                Some(target) => record = self.require(target)?,
                None => return Ok(record.value()),
            }
        }
        Err(ParameterError::InvalidLink {
            name: key.to_string(),
            target: record.name(),
            reason: "link chain contains a cycle".to_string(),
        })
    }

    /// Copy effective values onto linked records so every record reports the
    /// value the model sees.
    pub fn sync_links(&mut self) -> std::result::Result<(), ParameterError> {
        for i in 0..self.records.len() {
            if self.records[i].is_linked() {
                let value = self.effective_value(self.records[i].key())?;
                self.records[i].assign(value);
            }
        }
        Ok(())
    }

    /// Effective values of `names` for one buffer, in the order given.
    pub fn values_for_buffer(
        &self,
        names: &[String],
        buffer: usize,
    ) -> std::result::Result<Vec<f64>, ParameterError> {
        names
            .iter()
            .map(|name| self.effective_value(&QualifiedName::new(name.clone(), buffer)))
            .collect()
    }

    /// Keys of records the minimizer adjusts, in set order.
    pub fn free_keys(&self) -> Vec<QualifiedName> {
        self.records
            .iter()
            .filter(|p| p.is_free())
            .map(|p| p.key().clone())
            .collect()
    }

    pub fn free_count(&self) -> usize {
        self.records.iter().filter(|p| p.is_free()).count()
    }

    /// Records the minimizer adjusts.
    pub fn free_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.records.iter().filter(|p| p.is_free())
    }

    /// Number of distinct buffers with at least one record.
    pub fn buffer_count(&self) -> usize {
        self.buffers().len()
    }

    /// Hold a record at `value`.
    pub fn fix(&mut self, key: &QualifiedName, value: f64) -> std::result::Result<(), ParameterError> {
        self.require_mut(key)?.fix(value)
    }

    /// Reset every record to its creation value.
    pub fn reset(&mut self) {
        for record in &mut self.records {
            record.reset();
        }
    }

    /// Reference-independent copy of the whole set.
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Extract one buffer's records, re-keyed to buffer 0.
    ///
    /// Links within the buffer are carried over; a link to another buffer is
    /// rejected with [`ParameterError::InvalidLink`].
    pub fn for_buffer(&self, buffer: usize) -> std::result::Result<Self, ParameterError> {
        let mut set = Self::new();
        for record in self.records_for_buffer(buffer) {
            let mut copy = record.clone();
            copy.rekey(record.key().with_buffer(0));
            if let Some(target) = record.link() {
                if target.buffer() != buffer {
                    return Err(ParameterError::InvalidLink {
                        name: record.name(),
                        target: target.to_string(),
                        reason: "links across buffers are not allowed in an independent fit".to_string(),
                    });
                }
                copy.set_link(Some(target.with_buffer(0)));
            }
            set.add(copy)?;
        }
        Ok(set)
    }

    /// Move every record of buffer 0 to `buffer`, the inverse of [`for_buffer`](Self::for_buffer).
    pub fn rekeyed_to_buffer(&self, buffer: usize) -> Self {
        let mut set = Self::new();
        for record in &self.records {
            let mut copy = record.clone();
            copy.rekey(record.key().with_buffer(buffer));
            if let Some(target) = record.link() {
                copy.set_link(Some(target.with_buffer(buffer)));
            }
            set.push(copy);
        }
        set
    }

    /// Check every link target exists and no chain loops.
    pub fn validate_links(&self) -> std::result::Result<(), ParameterError> {
        for record in &self.records {
            if let Some(target) = record.link() {
                if !self.contains(target) {
                    return Err(ParameterError::InvalidLink {
                        name: record.name(),
                        target: target.to_string(),
                        reason: "target does not exist".to_string(),
                    });
                }
            }
            self.effective_value(record.key())?;
        }
        Ok(())
    }

    /// Check the set fully populates `model` for buffers `0..buffer_count`
    /// and names nothing the model does not declare.
    pub fn check_model(&self, model: &Model, buffer_count: usize) -> std::result::Result<(), ParameterError> {
        for record in &self.records {
            if !model.has_parameter(record.base()) {
                return Err(ParameterError::InvalidName {
                    name: record.name(),
                    reason: format!("'{}' is not a parameter of model '{}'", record.base(), model.name()),
                });
            }
            if record.buffer() >= buffer_count {
                return Err(ParameterError::InvalidName {
                    name: record.name(),
                    reason: format!("buffer index is outside the {buffer_count} fitted buffer(s)"),
                });
            }
        }
        for buffer in 0..buffer_count {
            for name in model.parameter_names() {
                self.require(&QualifiedName::new(name.clone(), buffer))?;
            }
        }
        self.validate_links()
    }

    /// Save the set to a JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a set from a JSON file; links are re-validated.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl TryFrom<Vec<Parameter>> for ParameterSet {
    type Error = ParameterError;

    fn try_from(records: Vec<Parameter>) -> std::result::Result<Self, Self::Error> {
        let mut set = Self::new();
        for record in records {
            set.add(record)?;
        }
        set.validate_links()?;
        Ok(set)
    }
}

impl From<ParameterSet> for Vec<Parameter> {
    fn from(set: ParameterSet) -> Self {
        set.records
    }
}

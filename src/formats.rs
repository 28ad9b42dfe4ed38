//! Pluggable dataset readers.
//!
//! No file format ships with the crate: applications register a
//! [`DatasetReader`] per format name and the session dispatches on it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::dataset::Dataset;
use crate::error::{Result, SavukaError};

/// Reads one file into one or more buffers.
pub trait DatasetReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<Dataset>>;
}

impl<F> DatasetReader for F
where
    F: Fn(&Path) -> Result<Vec<Dataset>> + Send + Sync,
{
    fn read(&self, path: &Path) -> Result<Vec<Dataset>> {
        self(path)
    }
}

/// Format name to reader mapping. Names are case-insensitive.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    readers: BTreeMap<String, Arc<dyn DatasetReader>>,
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.names())
            .finish()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `reader` under `name`, replacing any previous reader.
    pub fn register(&mut self, name: &str, reader: Arc<dyn DatasetReader>) {
        self.readers.insert(name.to_ascii_lowercase(), reader);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn DatasetReader>> {
        self.readers
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| SavukaError::UnknownFormat {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Read `path` with the reader registered for `format`.
    pub fn read(&self, path: &Path, format: &str) -> Result<Vec<Dataset>> {
        let reader = self.resolve(format)?;
        reader.read(path)
    }

    pub fn names(&self) -> Vec<String> {
        self.readers.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.readers.contains_key(&name.to_ascii_lowercase())
    }
}

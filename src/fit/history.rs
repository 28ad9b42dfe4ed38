//! Append-only record of completed fits.

use std::sync::Arc;

use crate::error::{Result, SavukaError};

use super::result::FitResult;

/// Completed fits in chronological order.
///
/// Results are shared immutably; indexing counts back from the most recent
/// fit, so `nth_recent(0)` is the latest.
#[derive(Debug, Clone, Default)]
pub struct FitHistory {
    results: Vec<Arc<FitResult>>,
}

impl FitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: FitResult) -> Arc<FitResult> {
        let result = Arc::new(result);
        self.results.push(Arc::clone(&result));
        result
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// The `n`-th most recent result.
    pub fn nth_recent(&self, n: usize) -> Result<Arc<FitResult>> {
        let available = self.results.len();
        if n >= available {
            return Err(SavukaError::NoPriorFit {
                requested: n,
                available,
            });
        }
        Ok(Arc::clone(&self.results[available - 1 - n]))
    }

    pub fn latest(&self) -> Result<Arc<FitResult>> {
        self.nth_recent(0)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FitResult>> {
        self.results.iter()
    }
}

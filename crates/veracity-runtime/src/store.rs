//! Shared collection of final verdicts across many claims.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;
use veracity_core::Verdict;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("A verdict for claim {0} was already recorded")]
    Duplicate(usize),
}

/// Verdicts keyed by claim index, one writer per key.
#[derive(Debug, Default)]
pub struct VerdictStore {
    verdicts: RwLock<BTreeMap<usize, Verdict>>,
}

impl VerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the verdict for claim `index`. A second write for the same
    /// index is rejected and leaves the first verdict in place.
    pub fn insert(&self, index: usize, verdict: Verdict) -> Result<(), StoreError> {
        let mut verdicts = self.verdicts.write();
        if verdicts.contains_key(&index) {
            return Err(StoreError::Duplicate(index));
        }
        verdicts.insert(index, verdict);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<Verdict> {
        self.verdicts.read().get(&index).cloned()
    }

    pub fn len(&self) -> usize {
        self.verdicts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.verdicts.read().is_empty()
    }

    /// All verdicts, ordered by claim index.
    pub fn snapshot(&self) -> BTreeMap<usize, Verdict> {
        self.verdicts.read().clone()
    }

    pub fn into_inner(self) -> BTreeMap<usize, Verdict> {
        self.verdicts.into_inner()
    }
}

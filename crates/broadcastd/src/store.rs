//! Deduplicating value store

use crate::storage::{Storage, StorageError};
use broadcast_core::Value;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// The set of values this node has observed.
///
/// Values only ever accumulate. The in-memory set is authoritative; the
/// optional journal mirrors it for restarts.
#[derive(Default)]
pub struct ValueStore {
    values: RwLock<HashSet<Value>>,
    journal: Option<Arc<Storage>>,
}

impl ValueStore {
    /// Create an empty, memory-only store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that journals new values, pre-populated from `storage`
    pub fn with_journal(storage: Arc<Storage>) -> Result<Self, StorageError> {
        let values = storage.all_values().collect::<Result<HashSet<_>, _>>()?;
        info!("Recovered {} values from journal", values.len());

        Ok(Self {
            values: RwLock::new(values),
            journal: Some(storage),
        })
    }

    /// Insert `value` if absent. Returns true only for the call that caused
    /// the insertion; concurrent inserts of one value see exactly one true.
    pub fn insert(&self, value: Value) -> bool {
        let inserted = self.values.write().insert(value.clone());

        if inserted {
            if let Some(journal) = &self.journal {
                if let Err(e) = journal.put_value(&value) {
                    warn!("Failed to journal value {}: {}", value, e);
                }
            }
        }

        inserted
    }

    /// All values at one point in time, in no particular order
    pub fn snapshot(&self) -> Vec<Value> {
        self.values.read().iter().cloned().collect()
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values.read().contains(value)
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }

    /// Flush the journal, if any
    pub fn flush(&self) -> Result<(), StorageError> {
        match &self.journal {
            Some(journal) => journal.flush(),
            None => Ok(()),
        }
    }
}

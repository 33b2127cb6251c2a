//! Persistent value journal using sled

use broadcast_core::Value;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

/// On-disk key form of a [`Value`].
///
/// The wire form of `Value` is untagged, which postcard cannot decode, so the
/// journal keeps an explicitly tagged mirror.
#[derive(Serialize, Deserialize)]
enum StoredValue {
    Int(i64),
    Text(String),
}

impl From<&Value> for StoredValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Int(n) => StoredValue::Int(*n),
            Value::Text(s) => StoredValue::Text(s.clone()),
        }
    }
}

impl From<StoredValue> for Value {
    fn from(stored: StoredValue) -> Self {
        match stored {
            StoredValue::Int(n) => Value::Int(n),
            StoredValue::Text(s) => Value::Text(s),
        }
    }
}

fn value_key(value: &Value) -> Result<Vec<u8>, StorageError> {
    Ok(postcard::to_allocvec(&StoredValue::from(value))?)
}

/// Journal of every value this node has stored
pub struct Storage {
    db: Db,
    /// Value tree: postcard(value) -> ()
    values: sled::Tree,
}

impl Storage {
    /// Open storage at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let values = db.open_tree("values")?;

        Ok(Self { db, values })
    }

    /// Record a value; returns whether it was not journaled before
    pub fn put_value(&self, value: &Value) -> Result<bool, StorageError> {
        let key = value_key(value)?;
        let previous = self.values.insert(key, &[] as &[u8])?;
        Ok(previous.is_none())
    }

    /// Iterate all journaled values
    pub fn all_values(&self) -> impl Iterator<Item = Result<Value, StorageError>> + '_ {
        self.values.iter().map(|result| {
            let (key, _) = result?;
            let stored: StoredValue = postcard::from_bytes(&key)?;
            Ok(Value::from(stored))
        })
    }

    /// Flush all pending writes
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

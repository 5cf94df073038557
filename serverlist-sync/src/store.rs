//! The optimistic-concurrency store the shared record lives in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serverlist_core::Revision;

use crate::error::StoreError;

/// 32-byte key addressing a record.
pub type DataKey = [u8; 32];

/// A record as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub data: Vec<u8>,
    pub revision: Revision,
}

/// Versioned key-value store with revision-checked writes.
///
/// `write` must only succeed when `revision` is newer than the one the store
/// currently holds for `key`.
pub trait RemoteStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError>;

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for &T {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        (**self).read(key)
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        (**self).write(key, data, revision)
    }
}

impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        (**self).read(key)
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        (**self).write(key, data, revision)
    }
}

/// In-process store with registry semantics: a write is accepted only when
/// its revision is strictly greater than the stored one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<DataKey, StoreRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record under `key`, if any.
    pub fn snapshot(&self, key: &DataKey) -> Option<StoreRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl RemoteStore for MemoryStore {
    fn read(&self, key: &DataKey) -> Result<StoreRecord, StoreError> {
        self.snapshot(key).ok_or(StoreError::NotFound)
    }

    fn write(&self, key: &DataKey, data: &[u8], revision: Revision) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let current = records.get(key).map(|r| r.revision).unwrap_or(Revision::ZERO);
        if revision <= current {
            return Err(StoreError::Conflict { revision });
        }
        records.insert(
            *key,
            StoreRecord {
                data: data.to_vec(),
                revision,
            },
        );
        Ok(())
    }
}

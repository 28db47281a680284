//! Local key-value store consulted by FindValue and filled by Store.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use crate::common::Id;

/// Storage capability a [crate::Node] keeps the values it is asked to store in.
pub trait Storage: Debug + Send + Sync {
    fn get(&self, key: &Id) -> Option<Bytes>;

    fn set(&self, key: Id, value: Bytes);

    /// Number of stored values.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
/// Unbounded in-memory [Storage], without expiry.
pub struct MemoryStorage {
    values: Mutex<HashMap<Id, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &Id) -> Option<Bytes> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: Id, value: Bytes) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value);
    }

    fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_and_get() {
        let storage = MemoryStorage::new();
        let key = Id::from_key("1:name");

        assert!(storage.get(&key).is_none());
        assert!(storage.is_empty());

        storage.set(key, Bytes::from_static(b"Andrew the 1th"));
        assert_eq!(storage.get(&key), Some(Bytes::from_static(b"Andrew the 1th")));

        storage.set(key, Bytes::from_static(b"overwritten"));
        assert_eq!(storage.get(&key), Some(Bytes::from_static(b"overwritten")));
        assert_eq!(storage.len(), 1);
    }
}

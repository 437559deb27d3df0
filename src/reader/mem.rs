use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use super::{ReaderError, ReaderId, ReaderProvider, StorageReader};

/// In-memory registry of opened readers, keyed by identity.
#[derive(Debug, Default)]
pub struct MemReaderProvider {
    readers: RwLock<HashMap<ReaderId, StorageReader>>,
}

impl MemReaderProvider {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `reader` under its own identity, returning the reader it
    /// replaced.
    pub fn register(&self, reader: impl Into<StorageReader>) -> Option<StorageReader> {
        let reader = reader.into();
        self.readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reader.id(), reader)
    }

    /// Forget the reader stored under `id`.
    pub fn remove(&self, id: &ReaderId) -> Option<StorageReader> {
        self.readers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }
}

impl ReaderProvider for MemReaderProvider {
    fn open(&self, id: &ReaderId) -> Result<StorageReader, ReaderError> {
        self.readers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or(ReaderError::NotFound(*id))
    }
}

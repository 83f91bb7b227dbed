use super::{validate_key, Backend, KeyStream, StoreError};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Process-local backend. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries_mut().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.entries()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn has(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    async fn erase(&self, key: &str) -> Result<(), StoreError> {
        self.entries_mut()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> KeyStream {
        let keys: Vec<String> = self
            .entries()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        stream::iter(keys).boxed()
    }
}

//! In-process store with the same string semantics as the network backend.
//!
//! Useful for tests and for running the server without a store. `DUMP`
//! produces a kvlink-specific payload (a type tag followed by the raw
//! value), not the backend's serialization format.

use crate::error::{ClientError, Result};
use crate::store::{Connector, Store};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

const NOT_AN_INTEGER: &str = "ERR value is not an integer or out of range";
const OVERFLOW: &str = "ERR increment or decrement would overflow";
const NO_SUCH_KEY: &str = "ERR no such key";

const STRING_TAG: u8 = 0;

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    operations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many store operations have been executed.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    async fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        self.count();
        let mut entries = self.entries.write().await;
        let current = match entries.get(key) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| ClientError::Server(NOT_AN_INTEGER.into()))?,
            None => 0,
        };
        let next = current
            .checked_sub(delta)
            .ok_or_else(|| ClientError::Server(OVERFLOW.into()))?;
        entries.insert(key.to_string(), next.to_string());
        Ok(next)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.count();
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.count();
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn append(&self, key: &str, value: &str) -> Result<i64> {
        self.count();
        let mut entries = self.entries.write().await;
        let entry = entries.entry(key.to_string()).or_default();
        entry.push_str(value);
        Ok(entry.len() as i64)
    }

    async fn dbsize(&self) -> Result<i64> {
        self.count();
        Ok(self.entries.read().await.len() as i64)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        self.adjust(key, 1).await
    }

    async fn decrby(&self, key: &str, by: i64) -> Result<i64> {
        self.adjust(key, by).await
    }

    async fn del(&self, keys: &[String]) -> Result<i64> {
        self.count();
        let mut entries = self.entries.write().await;
        Ok(keys.iter().filter(|k| entries.remove(*k).is_some()).count() as i64)
    }

    async fn dump(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.count();
        Ok(self.entries.read().await.get(key).map(|value| {
            let mut payload = Vec::with_capacity(value.len() + 1);
            payload.push(STRING_TAG);
            payload.extend_from_slice(value.as_bytes());
            payload
        }))
    }

    async fn exists(&self, keys: &[String]) -> Result<i64> {
        self.count();
        let entries = self.entries.read().await;
        Ok(keys.iter().filter(|k| entries.contains_key(*k)).count() as i64)
    }

    async fn key_type(&self, key: &str) -> Result<String> {
        self.count();
        let name = if self.entries.read().await.contains_key(key) {
            "string"
        } else {
            "none"
        };
        Ok(name.to_string())
    }

    async fn renamenx(&self, key: &str, new_key: &str) -> Result<bool> {
        self.count();
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) {
            return Err(ClientError::Server(NO_SUCH_KEY.into()));
        }
        if entries.contains_key(new_key) {
            return Ok(false);
        }
        if let Some(value) = entries.remove(key) {
            entries.insert(new_key.to_string(), value);
        }
        Ok(true)
    }
}

/// Hands out one shared [`MemoryStore`], or refuses every connection.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    store: Option<Arc<MemoryStore>>,
}

impl MemoryConnector {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store: Some(store) }
    }

    /// A connector whose every attempt is refused.
    pub fn unreachable() -> Self {
        Self { store: None }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Store>> {
        match &self.store {
            Some(store) => Ok(store.clone()),
            None => Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("connect ECONNREFUSED {host}:{port}"),
            ))),
        }
    }
}

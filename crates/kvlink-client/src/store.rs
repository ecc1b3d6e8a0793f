//! The operations kvlink needs from a backend.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A string key-value store.
///
/// Implementations must accept concurrent calls on a shared reference; the
/// server holds exactly one store and hands it to every request.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Returns the length of the value after appending.
    async fn append(&self, key: &str, value: &str) -> Result<i64>;

    async fn dbsize(&self) -> Result<i64>;

    /// Returns the value after decrementing.
    async fn decr(&self, key: &str) -> Result<i64>;

    async fn decrby(&self, key: &str, by: i64) -> Result<i64>;

    /// Returns how many of `keys` were removed.
    async fn del(&self, keys: &[String]) -> Result<i64>;

    /// Serialized form of the value at `key`, `None` if absent.
    async fn dump(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Counts how many of `keys` exist. Repeated keys count repeatedly.
    async fn exists(&self, keys: &[String]) -> Result<i64>;

    /// The type name of the value at `key`, `"none"` if absent.
    async fn key_type(&self, key: &str) -> Result<String>;

    /// Renames `key` only if `new_key` does not exist yet.
    async fn renamenx(&self, key: &str, new_key: &str) -> Result<bool>;

    /// Why the store stopped taking commands, once it has. A closed store
    /// never recovers; open a new one through the [`Connector`].
    fn closed(&self) -> Option<String> {
        None
    }
}

/// Opens stores.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Resolves once the store at `host:port` is ready for commands.
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Store>>;
}

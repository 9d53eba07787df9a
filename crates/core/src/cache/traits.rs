use std::time::Duration;

use async_trait::async_trait;

use crate::connection::ConnectionState;

use super::Result;

/// Trait for plain string key-value operations.
///
/// Implementations return `Ok(None)` / `Ok(0)` / `Ok(false)` for a miss and
/// reserve `Err` for requests that did not complete.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Gets a value by key.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns how many of the given keys exist (0 or 1 for a single key).
    async fn exists(&self, key: &str) -> Result<u64>;

    /// Sets a value, overwriting any previous value and clearing its TTL.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Sets the TTL of an existing key. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Deletes a key. Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Sets a value with a TTL only if the key is absent. Returns true if set.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes a key only if it currently holds `expected`, atomically.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool>;
}

/// Trait for hash field operations.
#[async_trait]
pub trait HashStore: Send + Sync {
    /// Gets a hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Sets a hash field. Returns true if the field was newly created.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool>;

    /// Deletes a hash field. Returns true if the field existed.
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;
}

/// Trait for list operations.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Pushes a value onto the head of a list. Returns the new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<u64>;

    /// Pushes a value onto the tail of a list. Returns the new length.
    async fn rpush(&self, key: &str, value: &str) -> Result<u64>;

    /// Pops the head of a list. `None` if the list is empty or absent.
    async fn lpop(&self, key: &str) -> Result<Option<String>>;

    /// Pops the tail of a list. `None` if the list is empty or absent.
    async fn rpop(&self, key: &str) -> Result<Option<String>>;
}

/// Trait for observing and closing the store's connection.
#[async_trait]
pub trait StoreLifecycle: Send + Sync {
    /// Current connection state.
    fn connection_state(&self) -> ConnectionState;

    /// Closes the connection and stops any background work. Requests made
    /// afterwards fail with `CacheError::Offline`.
    async fn close(&self);
}

/// Combined trait for stores usable by the cache client.
pub trait FullStore: KeyValueStore + HashStore + ListStore + StoreLifecycle {}

impl<T: KeyValueStore + HashStore + ListStore + StoreLifecycle> FullStore for T {}

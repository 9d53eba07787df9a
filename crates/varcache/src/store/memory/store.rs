//! In-memory store implementation with LRU eviction.
//!
//! Mirrors the Redis semantics the client relies on:
//! - `SET` overwrites the value and clears any TTL
//! - Expired keys behave as absent (lazy expiration on access)
//! - String, hash and list commands fail with `WRONGTYPE` on another kind of key
//! - A hash or list whose last element is removed disappears
//! - A TTL too large to represent never expires

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use varcache_core::cache::{CacheError, HashStore, KeyValueStore, ListStore, Result, StoreLifecycle};
use varcache_core::connection::ConnectionState;

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

/// A single store entry with optional expiration.
#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.and_then(deadline);
        Self { value, expires_at }
    }

    /// Returns true if this entry has expired.
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// Expiry instant for `ttl` from now, `None` if it cannot be represented.
fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

/// In-memory store with LRU eviction.
///
/// Time is read from `tokio::time`, so tests running with a paused clock can
/// fast-forward through TTLs.
///
/// The store can be taken offline with [`MemoryStore::set_online`] to model an
/// unreachable server: every request then fails with `CacheError::Offline`.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    store: Arc<Mutex<LruCache<String, Entry>>>,
    online: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates a new in-memory store with LRU eviction.
    ///
    /// # Arguments
    ///
    /// * `max_entries` - Maximum number of keys before LRU eviction kicks in.
    ///
    /// # Panics
    ///
    /// Panics if `max_entries` is 0.
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).expect("max_entries must be > 0");
        Self {
            store: Arc::new(Mutex::new(LruCache::new(capacity))),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulates the connection going away (`false`) or coming back (`true`).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Offline)
        }
    }
}

/// Returns the live entry for `key`, dropping it first if it has expired.
fn live_entry<'a>(store: &'a mut LruCache<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    if store.peek(key).is_some_and(Entry::is_expired) {
        store.pop(key);
        return None;
    }
    store.get_mut(key)
}

fn wrong_type() -> CacheError {
    CacheError::OperationFailed(WRONG_TYPE.to_string())
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::Str(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> Result<u64> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;
        Ok(u64::from(live_entry(&mut store, key).is_some()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;
        store.put(key.to_string(), Entry::new(Value::Str(value.to_string()), None));
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        match live_entry(&mut store, key) {
            Some(entry) => {
                entry.expires_at = deadline(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        let existed = live_entry(&mut store, key).is_some();
        store.pop(key);
        Ok(existed)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        if live_entry(&mut store, key).is_some() {
            return Ok(false);
        }
        store.put(
            key.to_string(),
            Entry::new(Value::Str(value.to_string()), Some(ttl)),
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        let matches = match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::Str(current),
                ..
            }) => current.as_str() == expected,
            _ => false,
        };
        if matches {
            store.pop(key);
        }
        Ok(matches)
    }
}

#[async_trait]
impl HashStore for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(wrong_type()),
            None => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields
                .insert(field.to_string(), value.to_string())
                .is_none()),
            Some(_) => Err(wrong_type()),
            None => {
                let fields = HashMap::from([(field.to_string(), value.to_string())]);
                store.put(key.to_string(), Entry::new(Value::Hash(fields), None));
                Ok(true)
            }
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        let (removed, now_empty) = match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => (fields.remove(field).is_some(), fields.is_empty()),
            Some(_) => return Err(wrong_type()),
            None => return Ok(false),
        };
        if now_empty {
            store.pop(key);
        }
        Ok(removed)
    }
}

/// Which end of a list a push or pop works on.
#[derive(Debug, Clone, Copy)]
enum End {
    Head,
    Tail,
}

impl MemoryStore {
    async fn push(&self, key: &str, value: &str, end: End) -> Result<u64> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                match end {
                    End::Head => items.push_front(value.to_string()),
                    End::Tail => items.push_back(value.to_string()),
                }
                Ok(items.len() as u64)
            }
            Some(_) => Err(wrong_type()),
            None => {
                let items = VecDeque::from([value.to_string()]);
                store.put(key.to_string(), Entry::new(Value::List(items), None));
                Ok(1)
            }
        }
    }

    async fn pop(&self, key: &str, end: End) -> Result<Option<String>> {
        self.ensure_online()?;
        let mut store = self.store.lock().await;

        let (popped, now_empty) = match live_entry(&mut store, key) {
            Some(Entry {
                value: Value::List(items),
                ..
            }) => {
                let popped = match end {
                    End::Head => items.pop_front(),
                    End::Tail => items.pop_back(),
                };
                (popped, items.is_empty())
            }
            Some(_) => return Err(wrong_type()),
            None => return Ok(None),
        };
        if now_empty {
            store.pop(key);
        }
        Ok(popped)
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn lpush(&self, key: &str, value: &str) -> Result<u64> {
        self.push(key, value, End::Head).await
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        self.push(key, value, End::Tail).await
    }

    async fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.pop(key, End::Head).await
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.pop(key, End::Tail).await
    }
}

#[async_trait]
impl StoreLifecycle for MemoryStore {
    fn connection_state(&self) -> ConnectionState {
        let state = ConnectionState::initial().reconnected();
        if self.online.load(Ordering::SeqCst) {
            state
        } else {
            state.disconnected()
        }
    }

    async fn close(&self) {
        self.set_online(false);
    }
}

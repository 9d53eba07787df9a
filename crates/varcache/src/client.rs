//! The cache client handed to the rest of the application.
//!
//! Every operation is total: failures are logged and folded into `None` or
//! `false`, so callers cannot tell a miss from an unreachable server. Callers
//! that need the difference use [`CacheClient::store`], whose methods return
//! `Result`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use varcache_core::cache::{is_reserved_key, CacheError, FullStore};
use varcache_core::connection::ConnectionState;

use crate::config::Config;
use crate::heartbeat;
use crate::lock::{self, LockToken};
use crate::store::MemoryStore;

/// Key-value client with a supervised connection and a background heartbeat.
pub struct CacheClient {
    pub(crate) store: Arc<dyn FullStore>,
    shutdown_tx: broadcast::Sender<()>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

/// Logs a request that did not complete. Connection faults log at warn,
/// everything else at error.
pub(crate) fn log_failure(command: &'static str, key: &str, error: &CacheError) {
    if error.is_connection_error() {
        tracing::warn!(command, key, error = %error, "Cache request failed");
    } else {
        tracing::error!(command, key, error = %error, "Cache request failed");
    }
}

/// Refuses writes to keys the client manages itself.
fn check_writable(command: &'static str, key: &str) -> bool {
    if is_reserved_key(key) {
        let e = CacheError::InvalidArgument(format!("key {:?} is reserved", key));
        log_failure(command, key, &e);
        return false;
    }
    true
}

impl CacheClient {
    /// Wraps `store` and starts the heartbeat.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn FullStore>, heartbeat_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = heartbeat::spawn(Arc::clone(&store), heartbeat_interval, shutdown_rx);

        tracing::info!(
            heartbeat_interval_secs = heartbeat_interval.as_secs(),
            "Cache client started"
        );

        Self {
            store,
            shutdown_tx,
            heartbeat: Mutex::new(Some(handle)),
        }
    }

    /// Connects to Redis using `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the first connection cannot be established.
    #[cfg(feature = "redis")]
    pub async fn connect(config: &Config) -> varcache_core::cache::Result<Self> {
        let store = crate::store::RedisStore::connect(config).await?;
        Ok(Self::new(Arc::new(store), config.heartbeat_interval()))
    }

    /// Creates a client backed by the in-memory store.
    pub fn in_memory(config: &Config) -> Self {
        let store = MemoryStore::new(config.cache_max_entries.max(1));
        Self::new(Arc::new(store), config.heartbeat_interval())
    }

    /// The underlying store, with errors left intact.
    pub fn store(&self) -> &Arc<dyn FullStore> {
        &self.store
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.store.connection_state()
    }

    /// Reads `key`. `None` if the key is absent or the request failed.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(Some(value)) => {
                tracing::debug!(key, "Key found");
                Some(value)
            }
            Ok(None) => {
                tracing::debug!(key, "Key not found");
                None
            }
            Err(e) => {
                log_failure("GET", key, &e);
                None
            }
        }
    }

    /// Checks whether `key` exists. `Some(count)` with a non-zero count if it
    /// does, `None` if it does not or the request failed.
    pub async fn exists(&self, key: &str) -> Option<u64> {
        match self.store.exists(key).await {
            Ok(0) => {
                tracing::debug!(key, "Key does not exist");
                None
            }
            Ok(count) => {
                tracing::debug!(key, count, "Key exists");
                Some(count)
            }
            Err(e) => {
                log_failure("EXISTS", key, &e);
                None
            }
        }
    }

    /// Writes `value` and then sets a TTL of `ttl_seconds`.
    ///
    /// The two steps are separate requests. If the second one fails the key
    /// stays written without an expiry, and the call returns false. If the key
    /// disappeared between the two, both requests still completed and the
    /// call returns true.
    pub async fn set_with_expiry(&self, key: &str, value: &str, ttl_seconds: u64) -> bool {
        if !check_writable("SET", key) {
            return false;
        }
        if ttl_seconds == 0 {
            let e = CacheError::InvalidArgument("ttl must be at least one second".to_string());
            log_failure("SET", key, &e);
            return false;
        }

        if let Err(e) = self.store.set(key, value).await {
            log_failure("SET", key, &e);
            return false;
        }

        match self
            .store
            .expire(key, Duration::from_secs(ttl_seconds))
            .await
        {
            Ok(true) => {
                tracing::debug!(key, ttl_seconds, "Key set with expiry");
                true
            }
            Ok(false) => {
                tracing::warn!(key, ttl_seconds, "Key vanished before its TTL was set");
                true
            }
            Err(e) => {
                log_failure("EXPIRE", key, &e);
                false
            }
        }
    }

    /// Writes `value` without an expiry.
    pub async fn set(&self, key: &str, value: &str) -> bool {
        if !check_writable("SET", key) {
            return false;
        }
        match self.store.set(key, value).await {
            Ok(()) => {
                tracing::debug!(key, "Key set");
                true
            }
            Err(e) => {
                log_failure("SET", key, &e);
                false
            }
        }
    }

    /// Deletes `key`. True when the request went through, whether or not the
    /// key existed.
    pub async fn delete(&self, key: &str) -> bool {
        if !check_writable("DEL", key) {
            return false;
        }
        match self.store.delete(key).await {
            Ok(existed) => {
                tracing::debug!(key, existed, "Key deleted");
                true
            }
            Err(e) => {
                log_failure("DEL", key, &e);
                false
            }
        }
    }

    pub async fn hget(&self, key: &str, field: &str) -> Option<String> {
        match self.store.hget(key, field).await {
            Ok(value) => {
                tracing::debug!(key, field, found = value.is_some(), "Hash field read");
                value
            }
            Err(e) => {
                log_failure("HGET", key, &e);
                None
            }
        }
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> bool {
        if !check_writable("HSET", key) {
            return false;
        }
        match self.store.hset(key, field, value).await {
            Ok(created) => {
                tracing::debug!(key, field, created, "Hash field set");
                true
            }
            Err(e) => {
                log_failure("HSET", key, &e);
                false
            }
        }
    }

    pub async fn hdel(&self, key: &str, field: &str) -> bool {
        if !check_writable("HDEL", key) {
            return false;
        }
        match self.store.hdel(key, field).await {
            Ok(existed) => {
                tracing::debug!(key, field, existed, "Hash field deleted");
                true
            }
            Err(e) => {
                log_failure("HDEL", key, &e);
                false
            }
        }
    }

    /// Pushes `value` onto the head of the list at `key`.
    pub async fn lpush(&self, key: &str, value: &str) -> bool {
        if !check_writable("LPUSH", key) {
            return false;
        }
        match self.store.lpush(key, value).await {
            Ok(len) => {
                tracing::debug!(key, len, "Pushed to list head");
                true
            }
            Err(e) => {
                log_failure("LPUSH", key, &e);
                false
            }
        }
    }

    /// Pushes `value` onto the tail of the list at `key`.
    pub async fn rpush(&self, key: &str, value: &str) -> bool {
        if !check_writable("RPUSH", key) {
            return false;
        }
        match self.store.rpush(key, value).await {
            Ok(len) => {
                tracing::debug!(key, len, "Pushed to list tail");
                true
            }
            Err(e) => {
                log_failure("RPUSH", key, &e);
                false
            }
        }
    }

    /// Pops the head of the list at `key`. `None` if it is empty, absent, or
    /// the request failed.
    pub async fn lpop(&self, key: &str) -> Option<String> {
        if !check_writable("LPOP", key) {
            return None;
        }
        match self.store.lpop(key).await {
            Ok(value) => {
                tracing::debug!(key, found = value.is_some(), "Popped list head");
                value
            }
            Err(e) => {
                log_failure("LPOP", key, &e);
                None
            }
        }
    }

    /// Pops the tail of the list at `key`.
    pub async fn rpop(&self, key: &str) -> Option<String> {
        if !check_writable("RPOP", key) {
            return None;
        }
        match self.store.rpop(key).await {
            Ok(value) => {
                tracing::debug!(key, found = value.is_some(), "Popped list tail");
                value
            }
            Err(e) => {
                log_failure("RPOP", key, &e);
                None
            }
        }
    }

    /// Takes the distributed lock `name`, retrying for up to
    /// `acquire_timeout`. The lock frees itself after `lock_timeout`.
    pub async fn acquire_lock(
        &self,
        name: &str,
        lock_timeout: Duration,
        acquire_timeout: Duration,
    ) -> Option<LockToken> {
        match lock::acquire(self.store.as_ref(), name, lock_timeout, acquire_timeout).await {
            Ok(Some(token)) => {
                tracing::debug!(lock = name, "Lock acquired");
                Some(token)
            }
            Ok(None) => {
                tracing::warn!(
                    lock = name,
                    waited_ms = acquire_timeout.as_millis() as u64,
                    "Lock still held by another owner"
                );
                None
            }
            Err(e) => {
                log_failure("SET NX", name, &e);
                None
            }
        }
    }

    /// Releases the lock `name` if `token` still owns it.
    pub async fn release_lock(&self, name: &str, token: &LockToken) -> bool {
        match lock::release(self.store.as_ref(), name, token).await {
            Ok(true) => {
                tracing::debug!(lock = name, "Lock released");
                true
            }
            Ok(false) => {
                tracing::warn!(lock = name, "Lock was no longer held by this owner");
                false
            }
            Err(e) => {
                log_failure("EVAL", name, &e);
                false
            }
        }
    }

    /// Stops the heartbeat and closes the connection.
    ///
    /// Requests made afterwards return the not-found or failure value.
    pub async fn shutdown(&self) {
        // No receiver left means the heartbeat already stopped.
        let _ = self.shutdown_tx.send(());

        let handle = self.heartbeat.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Heartbeat task panicked");
            }
        }

        self.store.close().await;
        tracing::info!("Cache client stopped");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use varcache_core::cache::{
        HashStore, KeyValueStore, ListStore, Result, StoreLifecycle, HEARTBEAT_KEY,
    };

    use super::*;

    const HEARTBEAT: Duration = Duration::from_secs(60);

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn memory_client() -> (CacheClient, MemoryStore) {
        init_tracing();
        let store = MemoryStore::new(1000);
        let client = CacheClient::new(Arc::new(store.clone()), HEARTBEAT);
        (client, store)
    }

    /// Store whose EXPIRE always answers `reply`, to observe the gap between
    /// SET and EXPIRE.
    struct ScriptedExpire {
        inner: MemoryStore,
        reply: Result<bool>,
    }

    fn scripted_expire_client(reply: Result<bool>) -> CacheClient {
        init_tracing();
        let store = ScriptedExpire {
            inner: MemoryStore::new(100),
            reply,
        };
        CacheClient::new(Arc::new(store), HEARTBEAT)
    }

    #[async_trait]
    impl KeyValueStore for ScriptedExpire {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn exists(&self, key: &str) -> Result<u64> {
            self.inner.exists(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<bool> {
            self.reply.clone()
        }

        async fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key).await
        }

        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
            self.inner.set_if_absent(key, value, ttl).await
        }

        async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
            self.inner.delete_if_equals(key, expected).await
        }
    }

    #[async_trait]
    impl HashStore for ScriptedExpire {
        async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
            self.inner.hget(key, field).await
        }

        async fn hset(&self, key: &str, field: &str, value: &str) -> Result<bool> {
            self.inner.hset(key, field, value).await
        }

        async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
            self.inner.hdel(key, field).await
        }
    }

    #[async_trait]
    impl ListStore for ScriptedExpire {
        async fn lpush(&self, key: &str, value: &str) -> Result<u64> {
            self.inner.lpush(key, value).await
        }

        async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
            self.inner.rpush(key, value).await
        }

        async fn lpop(&self, key: &str) -> Result<Option<String>> {
            self.inner.lpop(key).await
        }

        async fn rpop(&self, key: &str) -> Result<Option<String>> {
            self.inner.rpop(key).await
        }
    }

    #[async_trait]
    impl StoreLifecycle for ScriptedExpire {
        fn connection_state(&self) -> ConnectionState {
            self.inner.connection_state()
        }

        async fn close(&self) {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_get_never_written_key() {
        let (client, _) = memory_client();
        assert_eq!(client.get("never:written").await, None);
        assert_eq!(client.exists("never:written").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_with_expiry_lifecycle() {
        let (client, _) = memory_client();

        assert!(client.set_with_expiry("k1", "v1", 5).await);
        assert_eq!(client.get("k1").await, Some("v1".to_string()));
        assert_eq!(client.exists("k1").await, Some(1));

        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(client.get("k1").await, None);
        assert_eq!(client.exists("k1").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_set_with_expiry_restarts_ttl() {
        let (client, _) = memory_client();

        assert!(client.set_with_expiry("code", "1234", 5).await);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(client.set_with_expiry("code", "1234", 5).await);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(client.get("code").await, Some("1234".to_string()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(client.get("code").await, None);
    }

    #[tokio::test]
    async fn test_set_with_expiry_overwrites() {
        let (client, _) = memory_client();

        assert!(client.set_with_expiry("code", "old", 60).await);
        assert!(client.set_with_expiry("code", "new", 60).await);
        assert_eq!(client.get("code").await, Some("new".to_string()));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let (client, _) = memory_client();

        assert!(!client.set_with_expiry("code", "1234", 0).await);
        assert_eq!(client.get("code").await, None);
    }

    #[tokio::test]
    async fn test_offline_requests_fail_fast() {
        let (client, store) = memory_client();
        assert!(client.set("key", "value").await);
        store.set_online(false);

        let started = tokio::time::Instant::now();
        assert_eq!(client.get("key").await, None);
        assert_eq!(client.exists("key").await, None);
        assert!(!client.set_with_expiry("key", "value", 10).await);
        assert!(!client.set("key", "value").await);
        assert!(!client.delete("key").await);
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(!client.connection_state().is_connected());

        store.set_online(true);
        assert_eq!(client.get("key").await, Some("value".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_expire_leaves_key_without_ttl() {
        let client = scripted_expire_client(Err(CacheError::ConnectionFailed(
            "connection reset".to_string(),
        )));

        assert!(!client.set_with_expiry("k1", "v1", 5).await);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(client.get("k1").await, Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_expire_on_vanished_key_still_succeeds() {
        let client = scripted_expire_client(Ok(false));

        assert!(client.set_with_expiry("k1", "v1", 5).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_does_not_panic() {
        let (client, _) = memory_client();

        assert!(client.set_with_expiry("k", "v", u64::MAX).await);
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        assert_eq!(client.get("k").await, Some("v".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_lock_wait_does_not_panic() {
        let (client, _) = memory_client();
        let hold = Duration::from_secs(5);

        let _held = client
            .acquire_lock("n", hold, Duration::ZERO)
            .await
            .expect("free lock should be acquired");

        let token = client.acquire_lock("n", hold, Duration::MAX).await;
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn test_reserved_keys_are_not_writable() {
        let (client, store) = memory_client();
        store.set(HEARTBEAT_KEY, "1700000000000").await.unwrap();

        assert!(!client.set(HEARTBEAT_KEY, "0").await);
        assert!(!client.set_with_expiry(HEARTBEAT_KEY, "0", 5).await);
        assert!(!client.delete(HEARTBEAT_KEY).await);
        assert!(!client.set("lock:login_count", "forged").await);
        assert!(!client.rpush("lock:queue", "x").await);

        assert_eq!(
            client.get(HEARTBEAT_KEY).await,
            Some("1700000000000".to_string())
        );
        assert_eq!(client.get("lock:login_count").await, None);
    }

    #[tokio::test]
    async fn test_lists() {
        let (client, store) = memory_client();

        assert!(client.rpush("queue", "b").await);
        assert!(client.rpush("queue", "c").await);
        assert!(client.lpush("queue", "a").await);

        assert_eq!(client.lpop("queue").await, Some("a".to_string()));
        assert_eq!(client.rpop("queue").await, Some("c".to_string()));
        assert_eq!(client.lpop("queue").await, Some("b".to_string()));
        assert_eq!(client.rpop("queue").await, None);

        store.set_online(false);
        assert!(!client.lpush("queue", "a").await);
        assert_eq!(client.lpop("queue").await, None);
    }

    #[tokio::test]
    async fn test_store_distinguishes_miss_from_failure() {
        let (client, store) = memory_client();

        assert_eq!(client.store().get("missing").await, Ok(None));

        store.set_online(false);
        assert_eq!(client.store().get("missing").await, Err(CacheError::Offline));
        assert_eq!(client.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_set_and_delete() {
        let (client, _) = memory_client();

        assert!(client.set("user:1", "alice").await);
        assert_eq!(client.get("user:1").await, Some("alice".to_string()));
        assert!(client.delete("user:1").await);
        assert_eq!(client.get("user:1").await, None);
        assert!(client.delete("user:1").await);
    }

    #[tokio::test]
    async fn test_hash_fields() {
        let (client, _) = memory_client();

        assert!(client.hset("login_count", "chat1", "2").await);
        assert_eq!(
            client.hget("login_count", "chat1").await,
            Some("2".to_string())
        );
        assert!(client.hdel("login_count", "chat1").await);
        assert_eq!(client.hget("login_count", "chat1").await, None);
    }

    #[tokio::test]
    async fn test_wrong_type_is_folded() {
        let (client, _) = memory_client();

        assert!(client.hset("profile", "name", "alice").await);
        assert_eq!(client.get("profile").await, None);
        assert_eq!(client.exists("profile").await, Some(1));

        // SET replaces a key of any type.
        assert!(client.set_with_expiry("profile", "x", 5).await);
        assert_eq!(client.get("profile").await, Some("x".to_string()));
        assert_eq!(client.hget("profile", "name").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locks() {
        let (client, _) = memory_client();
        let hold = Duration::from_secs(10);

        let token = client
            .acquire_lock("login_count", hold, Duration::ZERO)
            .await
            .expect("free lock should be acquired");
        assert!(client
            .acquire_lock("login_count", hold, Duration::from_millis(200))
            .await
            .is_none());

        assert!(client.release_lock("login_count", &token).await);
        assert!(!client.release_lock("login_count", &token).await);

        assert!(client
            .acquire_lock("login_count", hold, Duration::ZERO)
            .await
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_is_written_and_monotonic() {
        let (client, _) = memory_client();

        assert_eq!(client.get(HEARTBEAT_KEY).await, None);

        tokio::time::sleep(HEARTBEAT + Duration::from_secs(1)).await;
        let first: i64 = client.get(HEARTBEAT_KEY).await.unwrap().parse().unwrap();

        tokio::time::sleep(HEARTBEAT).await;
        let second: i64 = client.get(HEARTBEAT_KEY).await.unwrap().parse().unwrap();

        assert!(second >= first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_heartbeat_and_closes_store() {
        let (client, store) = memory_client();

        client.shutdown().await;

        assert!(client.heartbeat.lock().unwrap().is_none());
        assert!(!client.connection_state().is_connected());

        store.set_online(true);
        tokio::time::sleep(HEARTBEAT * 3).await;
        assert_eq!(store.get(HEARTBEAT_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_in_memory_from_config() {
        let config = Config::from_lookup(|_| None);
        let client = CacheClient::in_memory(&config);

        assert!(client.connection_state().is_connected());
        assert!(client.set_with_expiry("k", "v", 1).await);
        client.shutdown().await;
    }
}

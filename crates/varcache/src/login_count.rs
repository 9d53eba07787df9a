//! Per-server login counter.
//!
//! The counts live in the [`LOGIN_COUNT_KEY`] hash, one field per server.
//! Every change is a read-modify-write under the [`LOGIN_COUNT_LOCK`] lock so
//! concurrent servers cannot lose updates.

use std::time::Duration;

use varcache_core::cache::{LOGIN_COUNT_KEY, LOGIN_COUNT_LOCK};
use varcache_core::counter::{decrement, increment, parse_count};

use crate::client::{log_failure, CacheClient};
use crate::lock::LockToken;

/// How long the counter lock is held at most.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the counter lock.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

impl CacheClient {
    /// Current login count of `server`. `None` if the request failed or the
    /// stored value is not a count.
    pub async fn login_count(&self, server: &str) -> Option<u64> {
        self.read_count(server).await
    }

    /// Adds one to the login count of `server`.
    pub async fn increase_count(&self, server: &str) -> bool {
        let Some(token) = self.lock_counts(server).await else {
            return false;
        };
        let updated = self.adjust_count(server, increment).await;
        self.release_lock(LOGIN_COUNT_LOCK, &token).await;
        updated
    }

    /// Removes one from the login count of `server`, stopping at zero.
    pub async fn decrease_count(&self, server: &str) -> bool {
        let Some(token) = self.lock_counts(server).await else {
            return false;
        };
        let updated = self.adjust_count(server, decrement).await;
        self.release_lock(LOGIN_COUNT_LOCK, &token).await;
        updated
    }

    /// Resets the login count of `server` to zero.
    pub async fn init_count(&self, server: &str) -> bool {
        let Some(token) = self.lock_counts(server).await else {
            return false;
        };
        let updated = self.hset(LOGIN_COUNT_KEY, server, "0").await;
        self.release_lock(LOGIN_COUNT_LOCK, &token).await;
        updated
    }

    /// Drops the login count of `server`.
    pub async fn del_count(&self, server: &str) -> bool {
        let Some(token) = self.lock_counts(server).await else {
            return false;
        };
        let updated = self.hdel(LOGIN_COUNT_KEY, server).await;
        self.release_lock(LOGIN_COUNT_LOCK, &token).await;
        updated
    }

    async fn lock_counts(&self, server: &str) -> Option<LockToken> {
        let token = self
            .acquire_lock(LOGIN_COUNT_LOCK, LOCK_TIMEOUT, ACQUIRE_TIMEOUT)
            .await;
        if token.is_none() {
            tracing::error!(server, "Login count left unchanged: lock unavailable");
        }
        token
    }

    async fn read_count(&self, server: &str) -> Option<u64> {
        let stored = match self.store.hget(LOGIN_COUNT_KEY, server).await {
            Ok(stored) => stored,
            Err(e) => {
                log_failure("HGET", LOGIN_COUNT_KEY, &e);
                return None;
            }
        };

        match parse_count(stored.as_deref()) {
            Ok(count) => Some(count),
            Err(e) => {
                log_failure("HGET", LOGIN_COUNT_KEY, &e);
                None
            }
        }
    }

    /// Must be called with the counter lock held.
    async fn adjust_count(&self, server: &str, step: fn(u64) -> u64) -> bool {
        let Some(count) = self.read_count(server).await else {
            return false;
        };
        let next = step(count);
        tracing::debug!(server, count = next, "Login count updated");
        self.hset(LOGIN_COUNT_KEY, server, &next.to_string()).await
    }
}

//! Distributed locks on top of `SET NX EX`.
//!
//! A lock is the key `lock:{name}` holding a random token. Only the holder of
//! the token may release it, and the TTL frees the lock if the holder dies.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use varcache_core::cache::{lock_key, KeyValueStore, Result};

/// Pause between two acquisition attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Shortest lock lifetime the server can express.
const MIN_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// Proof of ownership of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tries to take the lock `name` until `acquire_timeout` elapses.
///
/// Returns `Ok(None)` if someone else held the lock for the whole window.
/// The lock expires on its own after `lock_timeout` (at least one second).
pub async fn acquire<S>(
    store: &S,
    name: &str,
    lock_timeout: Duration,
    acquire_timeout: Duration,
) -> Result<Option<LockToken>>
where
    S: KeyValueStore + ?Sized,
{
    let key = lock_key(name);
    let token = LockToken::generate();
    let lock_timeout = lock_timeout.max(MIN_LOCK_TIMEOUT);
    // A window too long to represent has no deadline.
    let deadline = Instant::now().checked_add(acquire_timeout);

    loop {
        if store
            .set_if_absent(&key, token.as_str(), lock_timeout)
            .await?
        {
            return Ok(Some(token));
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Ok(None);
        }
        tokio::time::sleep(RETRY_INTERVAL).await;
    }
}

/// Releases the lock `name` if `token` still owns it.
///
/// Returns false if the lock expired or was taken over by someone else.
pub async fn release<S>(store: &S, name: &str, token: &LockToken) -> Result<bool>
where
    S: KeyValueStore + ?Sized,
{
    store.delete_if_equals(&lock_key(name), token.as_str()).await
}

/// Key the heartbeat task overwrites with the current timestamp.
///
/// Reserved: application data must not be stored under this key.
pub const HEARTBEAT_KEY: &str = "heartbeat";

/// Prefix of every distributed lock key.
pub const LOCK_KEY_PREFIX: &str = "lock:";

/// Hash holding the number of logged-in users per server, keyed by server name.
pub const LOGIN_COUNT_KEY: &str = "logincount";

/// Lock guarding every read-modify-write of [`LOGIN_COUNT_KEY`].
pub const LOGIN_COUNT_LOCK: &str = "lockcount";

/// Returns the cache key backing the distributed lock `name`.
///
/// # Examples
///
/// ```
/// use varcache_core::cache::lock_key;
///
/// assert_eq!(lock_key("login_count"), "lock:login_count");
/// ```
pub fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, name)
}

/// Returns true if `key` belongs to the client itself rather than to callers.
pub fn is_reserved_key(key: &str) -> bool {
    key == HEARTBEAT_KEY || key.starts_with(LOCK_KEY_PREFIX)
}

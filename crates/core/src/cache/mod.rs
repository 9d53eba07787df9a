mod error;
mod keys;
mod traits;

pub use error::{CacheError, Result};
pub use keys::{
    is_reserved_key, lock_key, HEARTBEAT_KEY, LOCK_KEY_PREFIX, LOGIN_COUNT_KEY, LOGIN_COUNT_LOCK,
};
pub use traits::{FullStore, HashStore, KeyValueStore, ListStore, StoreLifecycle};

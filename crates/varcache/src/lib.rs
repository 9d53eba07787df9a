//! Key-value cache helper over Redis.
//!
//! [`CacheClient`] owns one supervised connection, reconnects on its own when
//! the connection errors or closes, and writes a heartbeat timestamp on a
//! fixed interval. Request helpers never fail: misses and faults come back as
//! `None` or `false` and are logged through `tracing`.
//!
//! ```no_run
//! # async fn run() -> varcache::Result<()> {
//! let config = varcache::Config::from_env();
//! let client = varcache::CacheClient::connect(&config).await?;
//!
//! if client.set_with_expiry("otp:42", "1234", 300).await {
//!     assert_eq!(client.get("otp:42").await.as_deref(), Some("1234"));
//! }
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod heartbeat;
pub mod lock;
pub mod login_count;
pub mod store;

pub use client::CacheClient;
pub use config::Config;
pub use lock::LockToken;
pub use varcache_core::cache::{
    CacheError, FullStore, HashStore, KeyValueStore, ListStore, Result, StoreLifecycle,
    HEARTBEAT_KEY,
};
pub use varcache_core::connection::ConnectionState;

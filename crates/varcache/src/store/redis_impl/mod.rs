//! Redis store backend implementation.
//!
//! One multiplexed connection per store, shared by every request. A
//! background supervisor replaces the connection whenever a request observes
//! it failing, with backoff between attempts. While no connection is
//! available, requests fail immediately instead of being queued.

mod error;
mod store;
mod supervisor;

pub use store::RedisStore;

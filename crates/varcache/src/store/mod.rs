//! Store backend implementations.
//!
//! This module provides concrete implementations of the store traits
//! defined in `varcache_core::cache`.
//!
//! # Feature Flags
//!
//! - `redis` (default): Redis store with a supervised connection
//!
//! The in-memory store is always compiled. It backs the client's tests and
//! single-process deployments that have no Redis at hand.

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis_impl;

pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis_impl::RedisStore;

//! In-memory store backend implementation.
//!
//! Provides a thread-safe in-memory store with TTL support for
//! single-instance deployments and tests.

mod store;

pub use store::MemoryStore;

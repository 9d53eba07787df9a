//! Functional core for varcache.
//!
//! Everything in this crate is free of I/O: error types, the store traits the
//! client is written against, reserved keys, the connection state machine,
//! reconnect backoff, readiness parsing and login counter arithmetic. The
//! `varcache` crate supplies the imperative shell around it.

pub mod cache;
pub mod connection;
pub mod counter;
pub mod heartbeat;

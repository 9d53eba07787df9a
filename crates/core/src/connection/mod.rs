//! Connection health model.
//!
//! The shell owns the socket; this module decides what happens to it. The
//! supervisor feeds every [`ConnectionEvent`] through
//! [`ConnectionState::on_event`] and sleeps for whatever
//! [`BackoffPolicy::delay`] says between reconnect attempts.

mod backoff;
mod ready;
mod state;

pub use backoff::BackoffPolicy;
pub use ready::{parse_readiness, Readiness};
pub use state::{ConnectionEvent, ConnectionState, Transition};

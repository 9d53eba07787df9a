//! Redis error mapping to CacheError and connection events.

use varcache_core::cache::CacheError;
use varcache_core::connection::ConnectionEvent;

/// Maps Redis errors to CacheError.
pub fn map_redis_error(err: redis::RedisError) -> CacheError {
    if err.is_connection_refusal()
        || err.is_timeout()
        || err.is_connection_dropped()
        || err.is_io_error()
    {
        CacheError::ConnectionFailed(err.to_string())
    } else {
        CacheError::OperationFailed(err.to_string())
    }
}

/// Classifies an error observed on connection `generation`.
///
/// Returns `None` when the connection is still usable: server replies such as
/// `WRONGTYPE`, type conversion failures and response timeouts.
pub fn connection_event(err: &redis::RedisError, generation: u64) -> Option<ConnectionEvent> {
    if err.is_timeout() {
        None
    } else if err.is_connection_dropped() {
        Some(ConnectionEvent::End { generation })
    } else if err.is_connection_refusal() || err.is_io_error() {
        Some(ConnectionEvent::Error {
            generation,
            reason: err.to_string(),
        })
    } else {
        None
    }
}

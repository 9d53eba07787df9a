//! Login counter arithmetic.
//!
//! Counts are stored as decimal strings in a hash field. A missing field
//! counts as zero and a count never drops below zero.

use crate::cache::{CacheError, Result};

/// Parses a stored count. A missing field is zero.
///
/// # Errors
///
/// Returns `CacheError::OperationFailed` if the field holds something other
/// than a non-negative integer.
pub fn parse_count(stored: Option<&str>) -> Result<u64> {
    match stored {
        None => Ok(0),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CacheError::OperationFailed(format!("login count is not a number: {:?}", raw))
        }),
    }
}

pub fn increment(count: u64) -> u64 {
    count.saturating_add(1)
}

pub fn decrement(count: u64) -> u64 {
    count.saturating_sub(1)
}

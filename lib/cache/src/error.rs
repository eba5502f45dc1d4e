//! Error types for cache operations.

use std::fmt;

/// Errors from cache operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Could not reach the cache service.
    Connection { reason: String },
    /// The operation exceeded its timeout.
    ///
    /// Treated identically to any other failed operation by callers.
    Timeout,
    /// The cache service rejected the operation.
    Backend { reason: String },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection { reason } => {
                write!(f, "cache connection failed: {reason}")
            }
            Self::Timeout => write!(f, "cache operation timed out"),
            Self::Backend { reason } => {
                write!(f, "cache backend error: {reason}")
            }
        }
    }
}

impl std::error::Error for CacheError {}

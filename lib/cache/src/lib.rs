//! Key-value cache service abstraction for gatehouse.
//!
//! The session stores and the external flow engine coordinate through a
//! shared cache of single-key entries with explicit expiry. This crate
//! provides that abstraction (`KvCache`) with two backends:
//! - `MemoryCache`: in-process map, suitable for single-node deployments
//!   and tests
//! - `RedisCache`: shared Redis, for deployments where the redirect and the
//!   callback may land on different processes
//!
//! `take` is the single-use consumption primitive: it removes the entry as
//! it reads it, so when two requests race to consume the same key the
//! second observes absence. TTLs, not locks, bound staleness.

pub mod error;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::time::Duration;

pub use self::error::CacheError;
pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

/// A key-value cache supporting get/set-with-expiry.
///
/// All operations are single-key; no multi-key transactions are required
/// anywhere in gatehouse. Implementations bound every operation by a
/// timeout; a timed-out operation fails like any other.
#[async_trait]
pub trait KvCache: Send + Sync + std::fmt::Debug {
    /// Looks up a live entry. Expired entries are never returned.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Writes an entry with an expiry, overwriting any prior value.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Reads and removes an entry in one step.
    ///
    /// Of two callers racing on the same key, at most one observes the
    /// value; the other observes `None`.
    async fn take(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Removes an entry. Removing a missing entry is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

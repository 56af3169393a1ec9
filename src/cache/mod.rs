//! Durable response cache, split into named partitions.
//!
//! This module provides the storage half of the proxy:
//! - Keys derived from GET requests (URL plus an optional mode/credentials variant)
//! - Named partitions created on first write and kept until deleted
//! - Cross-partition matching for offline fallback
//! - No expiry; entries live until their partition is removed

mod entry;
mod key;
mod storage;
mod store;

pub use key::CacheKey;
pub use storage::{CacheStorage, SqliteStorage};
pub use store::CacheStore;

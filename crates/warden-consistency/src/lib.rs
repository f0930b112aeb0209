//! Warden Consistency - lock store seam and backends
//!
//! This crate provides:
//! - The `LockStore` / `LockHandle` traits every backend implements
//! - Lock entry model, listing queries and statistics
//! - `MemoryLockStore` for single-process deployments and tests
//! - `RedisLockStore` for shared deployments (feature `redis`)

pub mod lock;

// Re-export lock types
pub use lock::{
    AcquireOptions, Lock, LockEntry, LockHandle, LockQuery, LockSnapshot, LockState, LockStats,
    LockStore, MemoryLock, MemoryLockStore,
};
#[cfg(feature = "redis")]
pub use lock::{RedisLock, RedisLockStore};

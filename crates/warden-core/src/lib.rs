//! Warden Core - Locking protocol on top of a lock store
//!
//! This crate provides:
//! - The lock handle wrapper with graceful degradation
//! - Scoped lock managers
//! - The resource locking protocol for entity repositories
//! - Multi-key critical sections
//! - Entity-embedded leases and cached property reads

pub mod client;
pub mod critical;
pub mod handle;
pub mod lease;
pub mod lockable;
pub mod manager;
pub mod property_cache;

// Re-export commonly used types
pub use client::LockClient;
pub use critical::CriticalSection;
pub use handle::{acquire_lock, release_lock, release_on_error};
pub use lease::LeaseLockable;
pub use lockable::{Lockable, LockedObjQuery, short_type_name};
pub use manager::LockManager;
pub use property_cache::{DocumentSource, PropertyCache, check_doc_type};

pub use warden_common::{LockConfig, LockError, Result};
pub use warden_consistency::{AcquireOptions, Lock, LockHandle, LockStore, MemoryLockStore};

//! Warden Common - Shared error types and lease settings
//!
//! This crate provides the foundational types used across all Warden components:
//! - The lock error taxonomy
//! - Lease configuration and its defaults
//! - Lock key prefixes

pub mod config;
pub mod error;

// Re-exports for convenience
pub use config::LockConfig;
pub use error::{LockError, Result};

/// Default lease of an object lock
pub const DEFAULT_OBJECT_LEASE_SECS: u64 = 30;

/// Default lease of a class lock
pub const DEFAULT_CLASS_LEASE_SECS: u64 = 60;

/// Default lease of each critical section lock
pub const DEFAULT_CRITICAL_SECTION_LEASE_SECS: u64 = 60;

/// Default staleness bound of an entity-embedded lease
pub const DEFAULT_DOCUMENT_LEASE_SECS: u64 = 60 * 60;

/// Default time-to-live of a cached property
pub const DEFAULT_PROPERTY_CACHE_TTL_SECS: u64 = 12 * 60 * 60;

/// Default poll interval while waiting on a held lock
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

/// Prefix of per-object lock keys
pub const OBJECT_LOCK_PREFIX: &str = "object-lock";

/// Prefix of per-type lock keys
pub const CLASS_LOCK_PREFIX: &str = "class-lock";

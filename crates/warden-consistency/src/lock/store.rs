//! Lock store seam
//!
//! A lock store hands out lock handles by key. Handles are created unacquired;
//! mutual exclusion per key is the store's responsibility.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use warden_common::Result;

use super::model::AcquireOptions;

/// A lock handle over one key
#[async_trait]
pub trait LockHandle: Send + Sync + fmt::Debug {
    /// Key this handle locks
    fn key(&self) -> &str;

    /// Lease requested when the handle was created
    fn lease(&self) -> Duration;

    /// Fence token of the current grant, if the store issues them
    fn fence_token(&self) -> Option<u64> {
        None
    }

    /// Try to obtain the lock.
    ///
    /// Returns `Ok(false)` when a non-blocking attempt finds the key held or a
    /// bounded wait runs out. Backend failures surface as `StoreUnavailable`.
    async fn acquire(&mut self, options: AcquireOptions) -> Result<bool>;

    /// Give the lock back.
    ///
    /// Fails with `NotHeld` when this handle no longer owns the key.
    async fn release(&mut self) -> Result<()>;
}

/// Owned lock handle as returned by a store
pub type Lock = Box<dyn LockHandle>;

/// Key-based distributed lock provider
pub trait LockStore: Send + Sync {
    /// Create an unacquired handle for `key` with the given lease
    fn lock(&self, key: &str, lease: Duration) -> Lock;
}

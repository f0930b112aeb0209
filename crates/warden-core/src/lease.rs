//! Entity-embedded leases
//!
//! A lighter lock that lives on the entity itself: a lock date written with an
//! optimistic save. Whoever saves first wins; a lease older than the expiration
//! is considered abandoned and may be taken over.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;
use warden_common::{LockError, Result};

#[async_trait]
pub trait LeaseLockable: Send + Sync {
    fn lock_date(&self) -> Option<DateTime<Utc>>;

    fn set_lock_date(&mut self, lock_date: Option<DateTime<Utc>>);

    /// Persist the entity; fails with `Conflict` when another writer saved first
    async fn save(&mut self) -> Result<()>;

    /// Age after which a recorded lease counts as abandoned.
    ///
    /// Implementors normally return `LockConfig::document_lease()` from the
    /// settings their repository was built with.
    fn lease_expiration(&self) -> Duration;

    /// Whether the recorded lease, if any, was taken more than the expiration before `now`
    fn lease_is_free(&self, now: DateTime<Utc>) -> bool {
        let Some(lock_date) = self.lock_date() else {
            return true;
        };
        let expiration = TimeDelta::from_std(self.lease_expiration()).unwrap_or(TimeDelta::MAX);
        lock_date
            .checked_add_signed(expiration)
            .is_some_and(|expires_at| now > expires_at)
    }

    /// Take the lease at `now`.
    ///
    /// Returns `false` when a live lease is recorded or a concurrent writer
    /// saved first.
    async fn acquire_lease(&mut self, now: DateTime<Utc>) -> Result<bool> {
        if !self.lease_is_free(now) {
            return Ok(false);
        }

        let previous = self.lock_date();
        self.set_lock_date(Some(now));
        match self.save().await {
            Ok(()) => Ok(true),
            Err(LockError::Conflict(key)) => {
                debug!(key = %key, "Lost document lease to a concurrent writer");
                self.set_lock_date(previous);
                Ok(false)
            }
            Err(err) => {
                self.set_lock_date(previous);
                Err(err)
            }
        }
    }

    async fn release_lease(&mut self) -> Result<()> {
        if self.lock_date().is_none() {
            return Err(LockError::NotHeld("document lease".to_string()));
        }
        self.set_lock_date(None);
        self.save().await
    }
}

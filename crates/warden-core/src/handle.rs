//! Lock handle wrapper
//!
//! Translates lock store failures into either a null lock (when degrading
//! gracefully) or a propagated error. Only store communication failures may be
//! degraded on acquire, and only "lock not held" failures may be swallowed on
//! release.

use std::future::Future;

use metrics::counter;
use tracing::{debug, warn};
use warden_common::{LockError, Result};
use warden_consistency::{AcquireOptions, Lock};

/// Acquire `lock`, returning it once held.
///
/// With `degrade_gracefully` a store failure yields `Ok(None)` and the caller
/// proceeds without mutual exclusion. A non-blocking or time-bounded miss is
/// reported as `NotAcquired` so a returned lock is always held.
pub async fn acquire_lock(
    mut lock: Lock,
    degrade_gracefully: bool,
    options: AcquireOptions,
) -> Result<Option<Lock>> {
    match lock.acquire(options).await {
        Ok(true) => {
            counter!("warden_lock_acquired_total").increment(1);
            Ok(Some(lock))
        }
        Ok(false) => Err(LockError::NotAcquired(lock.key().to_string())),
        Err(err) if degrade_gracefully && err.is_store_failure() => {
            warn!(
                key = %lock.key(),
                error = %err,
                "Lock store unavailable, proceeding without lock"
            );
            counter!("warden_lock_degraded_total").increment(1);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Release `lock` if there is one.
///
/// A lock that already expired is only a warning when degrading gracefully;
/// any other failure propagates.
pub async fn release_lock(lock: Option<Lock>, degrade_gracefully: bool) -> Result<()> {
    let Some(mut lock) = lock else {
        return Ok(());
    };

    match lock.release().await {
        Ok(()) => Ok(()),
        Err(err) if degrade_gracefully && err.is_not_held() => {
            warn!(
                key = %lock.key(),
                lease_ms = lock.lease().as_millis() as u64,
                "Could not release lock, it is no longer held. The lease may be too short"
            );
            counter!("warden_lock_release_not_held_total").increment(1);
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Run `step` and release `lock` only if the step fails.
///
/// On success the lock is handed back still held.
pub async fn release_on_error<T, F>(lock: Option<Lock>, step: F) -> Result<(T, Option<Lock>)>
where
    F: Future<Output = Result<T>>,
{
    match step.await {
        Ok(value) => Ok((value, lock)),
        Err(err) => {
            release_best_effort(lock).await;
            Err(err)
        }
    }
}

/// Graceful release whose failure is only logged
pub(crate) async fn release_best_effort(lock: Option<Lock>) {
    if let Err(err) = release_lock(lock, true).await {
        warn!(error = %err, "Best-effort lock release failed");
    }
}

/// Release on a failure path, keeping the original error for the caller
pub(crate) async fn release_after_failure(lock: Option<Lock>, degrade_gracefully: bool) {
    if let Err(err) = release_lock(lock, degrade_gracefully).await {
        warn!(error = %err, "Lock release failed while unwinding an earlier error");
    }
}

/// Lock held across protocol steps; released from `Drop` unless taken back.
///
/// Covers a caller dropping the future midway and panics in entity callbacks.
pub(crate) struct InFlight(Option<Lock>);

impl InFlight {
    pub(crate) fn new(lock: Option<Lock>) -> Self {
        Self(lock)
    }

    pub(crate) fn take(&mut self) -> Option<Lock> {
        self.0.take()
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(lock) = self.0.take() {
            spawn_release(lock);
        }
    }
}

/// Release from a destructor, on the current runtime if there is one
pub(crate) fn spawn_release(lock: Lock) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(release_best_effort(Some(lock)));
        }
        Err(_) => {
            debug!(
                key = %lock.key(),
                "No runtime to release lock on drop, it will expire with its lease"
            );
        }
    }
}

//! Critical sections
//!
//! A critical section holds an ordered set of named locks for the duration of
//! a scope. It protects resources that are not a single stored entity, such as
//! an external partition two schedulers must not process at once.
//!
//! Locks are acquired in the order the keys were given. Callers that lock more
//! than one key must agree on a global key order; cycles are not detected.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};
use warden_common::{LockError, Result};
use warden_consistency::{AcquireOptions, Lock};

use crate::client::LockClient;
use crate::handle::{release_best_effort, spawn_release};

pub struct CriticalSection {
    client: LockClient,
    keys: Vec<String>,
    fail_hard: bool,
    lease: Duration,
    locks: Vec<Lock>,
    protected: bool,
}

impl CriticalSection {
    pub fn new<I, S>(client: &LockClient, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client: client.clone(),
            keys: keys.into_iter().map(Into::into).collect(),
            fail_hard: false,
            lease: client.config().critical_section_lease(),
            locks: Vec::new(),
            protected: false,
        }
    }

    /// Propagate acquisition failures instead of running unprotected
    pub fn fail_hard(mut self, fail_hard: bool) -> Self {
        self.fail_hard = fail_hard;
        self
    }

    /// Lease of each lock
    pub fn lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Whether every key is currently held by this section
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Acquire every key in order, waiting on each until it is free.
    ///
    /// Without `fail_hard` a failure is logged and the section proceeds
    /// unprotected; locks already obtained stay held until [`exit`](Self::exit).
    /// With `fail_hard` everything obtained so far is released and the error
    /// is returned.
    ///
    /// Entering again first releases what the previous entry obtained.
    pub async fn enter(&mut self) -> Result<()> {
        if !self.locks.is_empty() {
            self.exit().await;
        }
        self.locks = self
            .keys
            .iter()
            .map(|key| self.client.lock(key, self.lease))
            .collect();

        match self.acquire_all().await {
            Ok(()) => {
                self.protected = true;
                debug!(keys = ?self.keys, "Entered critical section");
                Ok(())
            }
            Err(err) if self.fail_hard => {
                self.exit().await;
                Err(err)
            }
            Err(err) => {
                warn!(
                    keys = ?self.keys,
                    error = %err,
                    "Could not lock critical section, proceeding unprotected"
                );
                counter!("warden_critical_section_unprotected_total").increment(1);
                Ok(())
            }
        }
    }

    async fn acquire_all(&mut self) -> Result<()> {
        for lock in self.locks.iter_mut() {
            if !lock.acquire(AcquireOptions::blocking()).await? {
                return Err(LockError::NotAcquired(lock.key().to_string()));
            }
            counter!("warden_lock_acquired_total").increment(1);
        }
        Ok(())
    }

    /// Release every lock created on entry, whether or not it was acquired
    pub async fn exit(&mut self) {
        self.protected = false;
        for lock in self.locks.drain(..) {
            release_best_effort(Some(lock)).await;
        }
    }

    /// Run `body` inside the section.
    ///
    /// Fails only when entry fails with `fail_hard` set; `body` is not run then.
    pub async fn run<F, Fut, R>(mut self, body: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        self.enter().await?;
        let out = body().await;
        self.exit().await;
        Ok(out)
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        for lock in self.locks.drain(..) {
            spawn_release(lock);
        }
    }
}

impl fmt::Debug for CriticalSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalSection")
            .field("keys", &self.keys)
            .field("fail_hard", &self.fail_hard)
            .field("lease", &self.lease)
            .field("protected", &self.protected)
            .finish()
    }
}

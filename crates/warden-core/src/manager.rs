//! Scoped lock manager
//!
//! `LockManager` pairs an object with the lock protecting it. It can be taken
//! apart with [`LockManager::into_parts`] for manual lifetime management, or
//! used as a scope that always releases the lock:
//!
//! ```ignore
//! let updated = patients
//!     .get_locked_obj(LockedObjQuery::criteria("pid-1234".to_string()).create(true))
//!     .await?
//!     .scope(|patient| async move { visit(patient).await })
//!     .await;
//! ```

use std::fmt;
use std::future::Future;

use warden_consistency::{Lock, LockHandle};

use crate::handle::{release_best_effort, spawn_release};

/// An object together with its held lock, or `(None, None)`
pub struct LockManager<T> {
    obj: Option<T>,
    lock: Option<Lock>,
}

impl<T> LockManager<T> {
    pub fn new(obj: Option<T>, lock: Option<Lock>) -> Self {
        Self { obj, lock }
    }

    /// Nothing found and nothing locked
    pub fn empty() -> Self {
        Self {
            obj: None,
            lock: None,
        }
    }

    pub fn obj(&self) -> Option<&T> {
        self.obj.as_ref()
    }

    pub fn obj_mut(&mut self) -> Option<&mut T> {
        self.obj.as_mut()
    }

    pub fn lock(&self) -> Option<&dyn LockHandle> {
        self.lock.as_deref()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Take the pair apart; the caller becomes responsible for releasing the lock
    pub fn into_parts(mut self) -> (Option<T>, Option<Lock>) {
        (self.obj.take(), self.lock.take())
    }

    /// Run `body` with the object, then release the lock.
    ///
    /// Release failures are logged and suppressed. If `body` panics or the
    /// returned future is dropped early, the lock is released from `Drop`.
    pub async fn scope<F, Fut, R>(mut self, body: F) -> R
    where
        F: FnOnce(Option<T>) -> Fut,
        Fut: Future<Output = R>,
    {
        let obj = self.obj.take();
        let out = body(obj).await;
        self.release().await;
        out
    }

    /// Release the lock now and hand back the object
    pub async fn release(mut self) -> Option<T> {
        release_best_effort(self.lock.take()).await;
        self.obj.take()
    }
}

impl<T> Drop for LockManager<T> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            spawn_release(lock);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for LockManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("obj", &self.obj)
            .field("lock", &self.lock)
            .finish()
    }
}

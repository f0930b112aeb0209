//! In-memory lock store
//!
//! Provides:
//! - Per-key mutual exclusion with leases
//! - Blocking acquisition that wakes on release or lease expiry
//! - Lock auto-release on timeout via a background sweep
//! - Inspection and admin operations for tests and tooling

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::one::RefMut;
use metrics::{counter, gauge};
use tokio::sync::Notify;
use tokio::time::{Instant, interval};
use tracing::{debug, info};
use warden_common::{LockError, Result};

use super::model::*;
use super::store::{Lock, LockHandle, LockStore};

/// In-process lock store shared by every handle it creates
pub struct MemoryLockStore {
    inner: Arc<MemoryInner>,
    /// Background task handle
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

struct Slot {
    entry: LockEntry,
    /// Woken on release so blocked acquirers retry
    notify: Arc<Notify>,
}

struct MemoryInner {
    slots: DashMap<String, Slot>,
    /// Store-wide so tokens keep increasing after a key's slot is reclaimed
    next_fence: AtomicU64,
    stats: LockStatsCollector,
}

#[derive(Default)]
struct LockStatsCollector {
    total_locks: AtomicU64,
    total_acquisitions: AtomicU64,
    total_releases: AtomicU64,
    expired_locks: AtomicU64,
    failed_acquisitions: AtomicU64,
    not_held_releases: AtomicU64,
    total_hold_time_ms: AtomicU64,
    completed_holds: AtomicU64,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                slots: DashMap::new(),
                next_fence: AtomicU64::new(0),
                stats: LockStatsCollector::default(),
            }),
            cleanup_handle: None,
        }
    }

    /// Start with background expiry sweep
    pub fn with_cleanup(mut self, every: Duration) -> Self {
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                inner.cleanup_expired_locks();
            }
        });

        info!(interval_ms = every.as_millis() as u64, "Memory lock store expiry sweep started");
        self.cleanup_handle = Some(handle);
        self
    }

    /// Snapshot of the lock stored under `key`
    pub fn get(&self, key: &str) -> Option<LockSnapshot> {
        self.inner.slots.get(key).map(|slot| slot.entry.snapshot())
    }

    /// Whether `key` is currently held by anyone
    pub fn is_locked(&self, key: &str) -> bool {
        self.inner
            .slots
            .get(key)
            .is_some_and(|slot| slot.entry.is_locked())
    }

    /// List locks matching the query
    pub fn list(&self, query: &LockQuery) -> Vec<LockSnapshot> {
        let mut results = Vec::new();

        for slot in self.inner.slots.iter() {
            let entry = &slot.entry;

            if let Some(ref prefix) = query.prefix
                && !entry.key.starts_with(prefix.as_str())
            {
                continue;
            }

            let snapshot = entry.snapshot();

            if let Some(state) = query.state
                && snapshot.state != state
            {
                continue;
            }

            if !query.include_expired && snapshot.state == LockState::Expired {
                continue;
            }

            results.push(snapshot);

            if results.len() >= query.limit {
                break;
            }
        }

        results.sort_by(|a, b| a.key.cmp(&b.key));
        results
    }

    /// Force release a lock (admin operation)
    pub fn force_release(&self, key: &str) -> bool {
        let Some(mut slot) = self.inner.slots.get_mut(key) else {
            return false;
        };
        slot.entry.force_release();
        slot.notify.notify_waiters();
        drop(slot);

        self.inner.stats.total_releases.fetch_add(1, Ordering::Relaxed);
        self.inner.reclaim(key);
        debug!(key = %key, "Lock force released");
        true
    }

    pub fn stats(&self) -> LockStats {
        let stats = &self.inner.stats;
        let active_locks = self
            .inner
            .slots
            .iter()
            .filter(|slot| slot.entry.is_locked())
            .count() as u32;

        let completed = stats.completed_holds.load(Ordering::Relaxed);
        let total_hold = stats.total_hold_time_ms.load(Ordering::Relaxed);
        let avg_hold = if completed > 0 {
            total_hold / completed
        } else {
            0
        };

        LockStats {
            total_locks: stats.total_locks.load(Ordering::Relaxed),
            active_locks,
            total_acquisitions: stats.total_acquisitions.load(Ordering::Relaxed),
            total_releases: stats.total_releases.load(Ordering::Relaxed),
            expired_locks: stats.expired_locks.load(Ordering::Relaxed),
            failed_acquisitions: stats.failed_acquisitions.load(Ordering::Relaxed),
            not_held_releases: stats.not_held_releases.load(Ordering::Relaxed),
            avg_hold_time_ms: avg_hold,
        }
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryLockStore {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_handle.take() {
            handle.abort();
        }
    }
}

impl LockStore for MemoryLockStore {
    fn lock(&self, key: &str, lease: Duration) -> Lock {
        Box::new(MemoryLock {
            inner: self.inner.clone(),
            key: key.to_string(),
            lease,
            token: uuid::Uuid::new_v4().to_string(),
            fence_token: None,
        })
    }
}

impl MemoryInner {
    fn slot(&self, key: &str) -> RefMut<'_, String, Slot> {
        self.slots.entry(key.to_string()).or_insert_with(|| {
            self.stats.total_locks.fetch_add(1, Ordering::Relaxed);
            Slot {
                entry: LockEntry::new(key),
                notify: Arc::new(Notify::new()),
            }
        })
    }

    fn notifier(&self, key: &str) -> Arc<Notify> {
        self.slot(key).notify.clone()
    }

    /// Grant the lock or report when the current lease runs out
    fn try_acquire(
        &self,
        key: &str,
        owner: &str,
        lease: Duration,
    ) -> std::result::Result<u64, Instant> {
        let mut slot = self.slot(key);

        if slot.entry.expire() {
            self.stats.expired_locks.fetch_add(1, Ordering::Relaxed);
        }

        if slot.entry.acquire(owner, lease) {
            slot.entry.fence_token = self.next_fence.fetch_add(1, Ordering::Relaxed) + 1;
            self.stats.total_acquisitions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, owner = %owner, "Lock acquired");
            return Ok(slot.entry.fence_token);
        }

        Err(slot.entry.expires_at.unwrap_or_else(Instant::now))
    }

    fn release(&self, key: &str, owner: &str) -> Result<()> {
        let Some(mut slot) = self.slots.get_mut(key) else {
            self.stats.not_held_releases.fetch_add(1, Ordering::Relaxed);
            return Err(LockError::NotHeld(key.to_string()));
        };

        if slot.entry.is_owned_by(owner)
            && let Some(acquired_at) = slot.entry.acquired_at
        {
            self.stats
                .total_hold_time_ms
                .fetch_add(acquired_at.elapsed().as_millis() as u64, Ordering::Relaxed);
            self.stats.completed_holds.fetch_add(1, Ordering::Relaxed);
        }

        if !slot.entry.release(owner) {
            self.stats.not_held_releases.fetch_add(1, Ordering::Relaxed);
            return Err(LockError::NotHeld(key.to_string()));
        }

        self.stats.total_releases.fetch_add(1, Ordering::Relaxed);
        slot.notify.notify_waiters();
        drop(slot);

        self.reclaim(key);
        debug!(key = %key, owner = %owner, "Lock released");
        Ok(())
    }

    /// A slot is only needed while locked or while someone holds its notifier
    fn is_idle(slot: &Slot) -> bool {
        !slot.entry.is_locked() && Arc::strong_count(&slot.notify) == 1
    }

    /// Drop the slot of `key` once nothing refers to it
    fn reclaim(&self, key: &str) {
        self.slots.remove_if(key, |_, slot| Self::is_idle(slot));
    }

    fn cleanup_expired_locks(&self) {
        let mut expired = 0u64;
        let mut alive = 0u64;

        self.slots.retain(|_, slot| {
            if slot.entry.expire() {
                expired += 1;
                slot.notify.notify_waiters();
            } else if slot.entry.is_locked() {
                alive += 1;
            }
            !Self::is_idle(slot)
        });

        if expired > 0 {
            self.stats.expired_locks.fetch_add(expired, Ordering::Relaxed);
            debug!(count = expired, "Expired lock leases cleaned up");
        }
        gauge!("warden_lock_alive").set(alive as f64);
    }
}

/// Handle over one key of a [`MemoryLockStore`]
pub struct MemoryLock {
    inner: Arc<MemoryInner>,
    key: String,
    lease: Duration,
    /// Owner token unique to this handle
    token: String,
    fence_token: Option<u64>,
}

impl MemoryLock {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for MemoryLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLock")
            .field("key", &self.key)
            .field("lease", &self.lease)
            .field("token", &self.token)
            .field("fence_token", &self.fence_token)
            .finish()
    }
}

#[async_trait]
impl LockHandle for MemoryLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn lease(&self) -> Duration {
        self.lease
    }

    fn fence_token(&self) -> Option<u64> {
        self.fence_token
    }

    async fn acquire(&mut self, options: AcquireOptions) -> Result<bool> {
        let deadline = options.blocking_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            // Register interest before trying so a release in between is not missed
            let notify = self.inner.notifier(&self.key);
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let lease_ends = match self.inner.try_acquire(&self.key, &self.token, self.lease) {
                Ok(fence_token) => {
                    self.fence_token = Some(fence_token);
                    counter!("warden_lock_store_grants_total").increment(1);
                    return Ok(true);
                }
                Err(lease_ends) => lease_ends,
            };

            if !options.blocking {
                self.inner
                    .stats
                    .failed_acquisitions
                    .fetch_add(1, Ordering::Relaxed);
                return Ok(false);
            }

            let wake_at = match deadline {
                Some(deadline) if Instant::now() >= deadline => {
                    self.inner
                        .stats
                        .failed_acquisitions
                        .fetch_add(1, Ordering::Relaxed);
                    return Ok(false);
                }
                Some(deadline) => lease_ends.min(deadline),
                None => lease_ends,
            };

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn release(&mut self) -> Result<()> {
        self.fence_token = None;
        self.inner.release(&self.key, &self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_basic_lock_acquire_release() {
        let store = MemoryLockStore::new();

        let mut first = store.lock("my-lock", LEASE);
        assert!(first.acquire(AcquireOptions::blocking()).await.unwrap());
        assert!(first.fence_token().unwrap() > 0);
        assert!(store.is_locked("my-lock"));

        // Another handle cannot take it without waiting
        let mut second = store.lock("my-lock", LEASE);
        assert!(!second.acquire(AcquireOptions::non_blocking()).await.unwrap());

        first.release().await.unwrap();
        assert!(!store.is_locked("my-lock"));

        assert!(second.acquire(AcquireOptions::non_blocking()).await.unwrap());
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_release() {
        let store = MemoryLockStore::new();

        let mut holder = store.lock("k", LEASE);
        holder.acquire(AcquireOptions::blocking()).await.unwrap();

        let mut waiter = store.lock("k", LEASE);
        let waiting = tokio::spawn(async move {
            let started = Instant::now();
            let acquired = waiter.acquire(AcquireOptions::blocking()).await.unwrap();
            (acquired, started.elapsed())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        holder.release().await.unwrap();

        let (acquired, waited) = waiting.await.unwrap();
        assert!(acquired);
        assert!(waited >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_blocked_waiter_gets_expired_lease() {
        let store = MemoryLockStore::new();

        let mut crashed = store.lock("k", Duration::from_millis(50));
        crashed.acquire(AcquireOptions::blocking()).await.unwrap();

        let mut waiter = store.lock("k", LEASE);
        let acquired = tokio::time::timeout(
            Duration::from_secs(5),
            waiter.acquire(AcquireOptions::blocking()),
        )
        .await
        .expect("lease expiry should wake the waiter")
        .unwrap();
        assert!(acquired);

        // The crashed holder lost its lock
        let err = crashed.release().await.unwrap_err();
        assert!(err.is_not_held());
        assert_eq!(store.stats().expired_locks, 1);
    }

    #[tokio::test]
    async fn test_bounded_wait_gives_up() {
        let store = MemoryLockStore::new();

        let mut holder = store.lock("k", LEASE);
        holder.acquire(AcquireOptions::blocking()).await.unwrap();

        let mut waiter = store.lock("k", LEASE);
        let options = AcquireOptions::blocking().with_timeout(Duration::from_millis(30));
        assert!(!waiter.acquire(options).await.unwrap());
        assert_eq!(store.stats().failed_acquisitions, 1);
    }

    #[tokio::test]
    async fn test_release_twice_is_not_held() {
        let store = MemoryLockStore::new();

        let mut lock = store.lock("k", LEASE);
        lock.acquire(AcquireOptions::blocking()).await.unwrap();
        lock.release().await.unwrap();

        let err = lock.release().await.unwrap_err();
        assert!(matches!(err, LockError::NotHeld(ref key) if key == "k"));

        // Never acquired
        let mut other = store.lock("never", LEASE);
        assert!(other.release().await.unwrap_err().is_not_held());
        assert_eq!(store.stats().not_held_releases, 2);
    }

    #[tokio::test]
    async fn test_fence_token_increases() {
        let store = MemoryLockStore::new();

        let mut first = store.lock("fence-lock", LEASE);
        first.acquire(AcquireOptions::blocking()).await.unwrap();
        let token1 = first.fence_token().unwrap();
        first.release().await.unwrap();
        assert_eq!(first.fence_token(), None);

        let mut second = store.lock("fence-lock", LEASE);
        second.acquire(AcquireOptions::blocking()).await.unwrap();
        assert!(second.fence_token().unwrap() > token1);
    }

    #[tokio::test]
    async fn test_force_release_wakes_waiter() {
        let store = Arc::new(MemoryLockStore::new());

        let mut holder = store.lock("k", LEASE);
        holder.acquire(AcquireOptions::blocking()).await.unwrap();

        let mut waiter = store.lock("k", LEASE);
        let waiting = tokio::spawn(async move { waiter.acquire(AcquireOptions::blocking()).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.force_release("k"));
        assert!(waiting.await.unwrap().unwrap());
        assert!(!store.force_release("missing"));
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let store = MemoryLockStore::new();

        let mut held = Vec::new();
        for name in ["class-lock-Patient", "object-lock-Patient-1", "object-lock-Patient-2"] {
            let mut lock = store.lock(name, LEASE);
            lock.acquire(AcquireOptions::blocking()).await.unwrap();
            held.push(lock);
        }

        let query = LockQuery {
            prefix: Some("object-lock-".to_string()),
            ..Default::default()
        };
        let keys: Vec<_> = store.list(&query).into_iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["object-lock-Patient-1", "object-lock-Patient-2"]);

        let snapshot = store.get("class-lock-Patient").unwrap();
        assert_eq!(snapshot.state, LockState::Locked);
        assert!(snapshot.remaining_lease_ms > 0);
        assert!(store.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_stats() {
        let store = MemoryLockStore::new();

        for i in 0..5 {
            let mut lock = store.lock(&format!("lock-{}", i), LEASE);
            lock.acquire(AcquireOptions::blocking()).await.unwrap();
            if i % 2 == 0 {
                lock.release().await.unwrap();
            }
        }

        let stats = store.stats();
        assert_eq!(stats.total_locks, 5);
        assert_eq!(stats.total_acquisitions, 5);
        assert_eq!(stats.total_releases, 3);
        assert_eq!(stats.active_locks, 2);
    }

    #[tokio::test]
    async fn test_cleanup_sweep_expires_leases() {
        let store = MemoryLockStore::new().with_cleanup(Duration::from_millis(10));

        let mut lock = store.lock("k", Duration::from_millis(20));
        lock.acquire(AcquireOptions::blocking()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Expired and unwaited, so the sweep reclaimed the slot
        assert!(store.get("k").is_none());
        assert_eq!(store.stats().expired_locks, 1);
    }

    #[tokio::test]
    async fn test_elapsed_lease_reports_expired() {
        let store = MemoryLockStore::new();

        let mut lock = store.lock("k", Duration::from_millis(10));
        lock.acquire(AcquireOptions::blocking()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.get("k").unwrap().state, LockState::Expired);
        assert!(!store.is_locked("k"));
        let query = LockQuery::default();
        assert!(store.list(&query).is_empty());
    }

    #[tokio::test]
    async fn test_release_reclaims_slot() {
        let store = Arc::new(MemoryLockStore::new());
        let everything = LockQuery {
            include_expired: true,
            ..Default::default()
        };

        for i in 0..10 {
            let mut lock = store.lock(&format!("object-lock-Patient-{}", i), LEASE);
            lock.acquire(AcquireOptions::blocking()).await.unwrap();
            lock.release().await.unwrap();
        }
        assert!(store.list(&everything).is_empty());

        // A waiting acquirer keeps the slot alive across the handoff
        let mut holder = store.lock("k", LEASE);
        holder.acquire(AcquireOptions::blocking()).await.unwrap();
        let mut waiter = store.lock("k", LEASE);
        let waiting = tokio::spawn(async move {
            waiter.acquire(AcquireOptions::blocking()).await.unwrap();
            waiter
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        holder.release().await.unwrap();
        let mut waiter = waiting.await.unwrap();
        assert!(store.is_locked("k"));

        waiter.release().await.unwrap();
        assert!(store.list(&everything).is_empty());
    }

    #[tokio::test]
    async fn test_fence_token_survives_reclaim() {
        let store = MemoryLockStore::new();
        let mut tokens = Vec::new();

        for _ in 0..3 {
            let mut lock = store.lock("k", LEASE);
            lock.acquire(AcquireOptions::blocking()).await.unwrap();
            tokens.push(lock.fence_token().unwrap());
            lock.release().await.unwrap();
            assert!(store.get("k").is_none());
        }
        assert!(tokens.windows(2).all(|pair| pair[1] > pair[0]));
    }
}

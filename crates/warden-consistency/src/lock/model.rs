//! Lock Entry Data Model

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Lock state enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Lock is available
    #[default]
    Unlocked,
    /// Lock is held by an owner
    Locked,
    /// Lease elapsed without a release
    Expired,
}

/// Options for a single acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireOptions {
    /// Wait for the current holder instead of returning at once
    pub blocking: bool,
    /// Upper bound on the wait; `None` waits until the lease is granted
    pub blocking_timeout: Option<Duration>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self::blocking()
    }
}

impl AcquireOptions {
    pub const fn blocking() -> Self {
        Self {
            blocking: true,
            blocking_timeout: None,
        }
    }

    pub const fn non_blocking() -> Self {
        Self {
            blocking: false,
            blocking_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.blocking = true;
        self.blocking_timeout = Some(timeout);
        self
    }
}

/// Stored state of one lock key
#[derive(Debug, Clone)]
pub struct LockEntry {
    pub key: String,
    pub state: LockState,
    /// Owner token of the current holder
    pub owner: Option<String>,
    /// Incremented on each state change
    pub version: u64,
    /// Monotonically increasing across grants, used for fencing
    pub fence_token: u64,
    pub acquired_at: Option<Instant>,
    pub expires_at: Option<Instant>,
    pub lease: Duration,
}

impl LockEntry {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            state: LockState::Unlocked,
            owner: None,
            version: 0,
            fence_token: 0,
            acquired_at: None,
            expires_at: None,
            lease: Duration::ZERO,
        }
    }

    /// Check if the lock is currently held
    pub fn is_locked(&self) -> bool {
        self.state == LockState::Locked && !self.is_expired()
    }

    /// Check if the lease has elapsed
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }

    /// Check if the given owner holds this lock
    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.is_locked() && self.owner.as_deref() == Some(owner)
    }

    pub fn remaining_lease(&self) -> Duration {
        self.expires_at
            .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// Grant the lock to `owner` for `lease`
    pub fn acquire(&mut self, owner: impl Into<String>, lease: Duration) -> bool {
        if self.is_locked() {
            return false;
        }

        let now = Instant::now();
        self.state = LockState::Locked;
        self.owner = Some(owner.into());
        self.acquired_at = Some(now);
        self.expires_at = Some(now + lease);
        self.lease = lease;
        self.version += 1;
        self.fence_token += 1;
        true
    }

    /// Release the lock held by `owner`
    pub fn release(&mut self, owner: &str) -> bool {
        if !self.is_owned_by(owner) {
            return false;
        }

        self.clear(LockState::Unlocked);
        true
    }

    /// Force release the lock (admin operation)
    pub fn force_release(&mut self) {
        self.clear(LockState::Unlocked);
    }

    /// Mark the entry expired once its lease has elapsed
    pub fn expire(&mut self) -> bool {
        if self.state == LockState::Locked && self.is_expired() {
            self.clear(LockState::Expired);
            return true;
        }
        false
    }

    fn clear(&mut self, state: LockState) {
        self.state = state;
        self.owner = None;
        self.acquired_at = None;
        self.expires_at = None;
        self.version += 1;
    }

    pub fn snapshot(&self) -> LockSnapshot {
        LockSnapshot {
            key: self.key.clone(),
            state: if self.state == LockState::Locked && self.is_expired() {
                LockState::Expired
            } else {
                self.state
            },
            owner: self.owner.clone(),
            version: self.version,
            fence_token: self.fence_token,
            remaining_lease_ms: self.remaining_lease().as_millis() as u64,
        }
    }
}

/// Point-in-time view of a lock entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSnapshot {
    pub key: String,
    pub state: LockState,
    pub owner: Option<String>,
    pub version: u64,
    pub fence_token: u64,
    pub remaining_lease_ms: u64,
}

/// Lock listing filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockQuery {
    /// Only keys starting with this prefix
    #[serde(default)]
    pub prefix: Option<String>,
    /// Filter by state
    #[serde(default)]
    pub state: Option<LockState>,
    /// Include expired locks
    #[serde(default)]
    pub include_expired: bool,
    /// Maximum results
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for LockQuery {
    fn default() -> Self {
        Self {
            prefix: None,
            state: None,
            include_expired: false,
            limit: default_limit(),
        }
    }
}

fn default_limit() -> usize {
    100
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Lock slots created; a key counts again once its idle slot was reclaimed
    pub total_locks: u64,
    /// Currently held locks
    pub active_locks: u32,
    pub total_acquisitions: u64,
    pub total_releases: u64,
    /// Leases that elapsed without a release
    pub expired_locks: u64,
    /// Attempts that returned without the lock
    pub failed_acquisitions: u64,
    /// Releases of locks that were no longer held
    pub not_held_releases: u64,
    pub avg_hold_time_ms: u64,
}

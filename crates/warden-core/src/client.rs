// Lock client
// Pairs a shared lock store with the lease settings used by the locking protocol

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use warden_common::LockConfig;
use warden_consistency::{Lock, LockStore};

use crate::critical::CriticalSection;

/// Entry point to a lock store, cheap to clone
#[derive(Clone)]
pub struct LockClient {
    store: Arc<dyn LockStore>,
    config: Arc<LockConfig>,
}

impl LockClient {
    /// Create a client with default leases
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_config(store, LockConfig::default())
    }

    pub fn with_config(store: Arc<dyn LockStore>, config: LockConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Create an unacquired lock handle
    pub fn lock(&self, key: &str, lease: Duration) -> Lock {
        self.store.lock(key, lease)
    }

    /// Critical section over `keys` with the configured lease
    pub fn critical_section<I, S>(&self, keys: I) -> CriticalSection
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CriticalSection::new(self, keys)
    }
}

impl fmt::Debug for LockClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

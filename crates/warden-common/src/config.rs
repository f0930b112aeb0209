// Lease configuration
// Default lease durations for object, class and critical-section locks

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    DEFAULT_CLASS_LEASE_SECS, DEFAULT_CRITICAL_SECTION_LEASE_SECS, DEFAULT_DOCUMENT_LEASE_SECS,
    DEFAULT_OBJECT_LEASE_SECS, DEFAULT_PROPERTY_CACHE_TTL_SECS, DEFAULT_RETRY_INTERVAL_MS,
};

/// Lease and timing settings used by the locking protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease of a per-object lock in seconds (default: 30s)
    pub object_lease_secs: u64,

    /// Lease of a per-type class lock in seconds (default: 60s)
    pub class_lease_secs: u64,

    /// Lease of each critical section lock in seconds (default: 60s)
    pub critical_section_lease_secs: u64,

    /// Age after which an entity-embedded lease is considered stale (default: 1h)
    pub document_lease_secs: u64,

    /// Time-to-live of cached property reads (default: 12h)
    pub property_cache_ttl_secs: u64,

    /// Poll interval for stores that cannot push release notifications (default: 100ms)
    pub retry_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            object_lease_secs: DEFAULT_OBJECT_LEASE_SECS,
            class_lease_secs: DEFAULT_CLASS_LEASE_SECS,
            critical_section_lease_secs: DEFAULT_CRITICAL_SECTION_LEASE_SECS,
            document_lease_secs: DEFAULT_DOCUMENT_LEASE_SECS,
            property_cache_ttl_secs: DEFAULT_PROPERTY_CACHE_TTL_SECS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

impl LockConfig {
    pub fn object_lease(&self) -> Duration {
        Duration::from_secs(self.object_lease_secs)
    }

    pub fn class_lease(&self) -> Duration {
        Duration::from_secs(self.class_lease_secs)
    }

    pub fn critical_section_lease(&self) -> Duration {
        Duration::from_secs(self.critical_section_lease_secs)
    }

    pub fn document_lease(&self) -> Duration {
        Duration::from_secs(self.document_lease_secs)
    }

    pub fn property_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.property_cache_ttl_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Reject settings that would make every lock expire immediately
    pub fn validate(&self) -> crate::Result<()> {
        let leases = [
            ("object_lease_secs", self.object_lease_secs),
            ("class_lease_secs", self.class_lease_secs),
            ("critical_section_lease_secs", self.critical_section_lease_secs),
        ];
        for (name, value) in leases {
            if value == 0 {
                return Err(crate::LockError::Config(format!("{name} must be positive")));
            }
        }
        if self.retry_interval_ms == 0 {
            return Err(crate::LockError::Config(
                "retry_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

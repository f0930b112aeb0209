//! Error types for Warden
//!
//! This module defines:
//! - `LockError`: the failure taxonomy shared by lock stores, the handle
//!   wrapper, the resource locking protocol and critical sections
//! - `Result`: crate-wide result alias

/// Lock subsystem error types
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    /// The lock store could not be reached or answered with a backend error
    #[error("lock store unavailable: {0}")]
    StoreUnavailable(String),

    /// Release of a lock that expired or was taken over by another holder
    #[error("lock '{0}' is not held")]
    NotHeld(String),

    /// A non-blocking or time-bounded acquisition did not obtain the lock
    #[error("lock '{0}' could not be acquired")]
    NotAcquired(String),

    /// An entity type was used with an operation it does not provide
    #[error("'{operation}' is not implemented for {type_name}")]
    NotImplemented {
        operation: &'static str,
        type_name: String,
    },

    /// A fetched record carries a type tag other than the expected one
    #[error("incompatible entity: expected '{expected}', found '{found}'")]
    IncompatibleEntity { expected: String, found: String },

    /// A concurrent writer updated the record first
    #[error("update conflict on '{0}'")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Failure raised by an entity store collaborator
    #[error(transparent)]
    Entity(#[from] anyhow::Error),
}

impl LockError {
    pub fn not_implemented(operation: &'static str, type_name: impl Into<String>) -> Self {
        LockError::NotImplemented {
            operation,
            type_name: type_name.into(),
        }
    }

    /// Whether the failure came from talking to the lock store.
    ///
    /// Only these failures are eligible for graceful degradation on acquire.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, LockError::StoreUnavailable(_))
    }

    /// Whether a release found the lock already gone
    pub fn is_not_held(&self) -> bool {
        matches!(self, LockError::NotHeld(_))
    }
}

pub type Result<T> = std::result::Result<T, LockError>;

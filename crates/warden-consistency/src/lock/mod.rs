//! Distributed Lock Stores
//!
//! This module provides:
//! - Lock entry data model and acquisition options
//! - The lock store seam consumed by the locking protocol
//! - An in-memory store with lease expiry
//! - A Redis store (feature `redis`)

mod memory;
mod model;
#[cfg(feature = "redis")]
mod redis_store;
mod store;

pub use memory::*;
pub use model::*;
#[cfg(feature = "redis")]
pub use redis_store::*;
pub use store::*;

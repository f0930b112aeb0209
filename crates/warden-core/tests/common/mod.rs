//! Common test utilities for integration testing
//!
//! This module provides shared test infrastructure including:
//! - FaultyLockStore: memory store with injectable acquire and release failures
//! - DomainRepo: in-memory entity repository keyed by domain name
//! - IdOnlyRepo: repository that only supports lookups by id

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use dashmap::DashMap;
use warden_core::{
    AcquireOptions, Lock, LockClient, LockError, LockHandle, LockStore, Lockable, MemoryLockStore,
    Result,
};

pub const LEASE: Duration = Duration::from_secs(30);

// ============================================================================
// Lock store with fault injection
// ============================================================================

#[derive(Default)]
struct Faults {
    acquire_prefixes: Mutex<Vec<String>>,
    release_store_error: AtomicBool,
}

impl Faults {
    fn acquire_fails(&self, key: &str) -> bool {
        self.acquire_prefixes
            .lock()
            .unwrap()
            .iter()
            .any(|prefix| key.starts_with(prefix.as_str()))
    }
}

/// Memory store whose handles can be told to fail like an unreachable backend
#[derive(Clone, Default)]
pub struct FaultyLockStore {
    inner: Arc<MemoryLockStore>,
    faults: Arc<Faults>,
}

impl FaultyLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &MemoryLockStore {
        &self.inner
    }

    /// Fail acquisition of every key starting with `prefix`; `""` fails all keys
    pub fn fail_acquire(&self, prefix: &str) {
        self.faults
            .acquire_prefixes
            .lock()
            .unwrap()
            .push(prefix.to_string());
    }

    pub fn fail_release(&self, fail: bool) {
        self.faults.release_store_error.store(fail, Ordering::SeqCst);
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.inner.is_locked(key)
    }

    pub fn client(&self) -> LockClient {
        LockClient::new(Arc::new(self.clone()))
    }
}

impl LockStore for FaultyLockStore {
    fn lock(&self, key: &str, lease: Duration) -> Lock {
        Box::new(FaultyLock {
            inner: self.inner.lock(key, lease),
            faults: self.faults.clone(),
        })
    }
}

#[derive(Debug)]
struct FaultyLock {
    inner: Lock,
    faults: Arc<Faults>,
}

impl std::fmt::Debug for Faults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Faults").finish_non_exhaustive()
    }
}

#[async_trait]
impl LockHandle for FaultyLock {
    fn key(&self) -> &str {
        self.inner.key()
    }

    fn lease(&self) -> Duration {
        self.inner.lease()
    }

    async fn acquire(&mut self, options: AcquireOptions) -> Result<bool> {
        if self.faults.acquire_fails(self.inner.key()) {
            return Err(LockError::StoreUnavailable("connection refused".to_string()));
        }
        self.inner.acquire(options).await
    }

    async fn release(&mut self) -> Result<()> {
        if self.faults.release_store_error.load(Ordering::SeqCst) {
            return Err(LockError::StoreUnavailable("connection reset".to_string()));
        }
        self.inner.release().await
    }
}

// ============================================================================
// Entity repositories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub id: String,
    pub name: String,
    pub version: u64,
}

/// Domains keyed by id, found by name
pub struct DomainRepo {
    client: LockClient,
    pub rows: DashMap<String, Domain>,
    pub creates: AtomicUsize,
    create_delay: Duration,
    fail_lookup: AtomicBool,
    fail_create: AtomicBool,
    panic_on_create: AtomicBool,
    /// Delete a row right after it is found by name, before its lock is taken
    vanish_after_lookup: AtomicBool,
}

impl DomainRepo {
    pub fn new(client: LockClient) -> Self {
        Self {
            client,
            rows: DashMap::new(),
            creates: AtomicUsize::new(0),
            create_delay: Duration::ZERO,
            fail_lookup: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            panic_on_create: AtomicBool::new(false),
            vanish_after_lookup: AtomicBool::new(false),
        }
    }

    /// Widen the window between the existence check and the insert
    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn insert(&self, name: &str) -> Domain {
        let domain = Domain {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            version: 1,
        };
        self.rows.insert(domain.id.clone(), domain.clone());
        domain
    }

    pub fn bump(&self, id: &str) {
        if let Some(mut row) = self.rows.get_mut(id) {
            row.version += 1;
        }
    }

    pub fn fail_lookup(&self, fail: bool) {
        self.fail_lookup.store(fail, Ordering::SeqCst);
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn panic_on_create(&self, panic: bool) {
        self.panic_on_create.store(panic, Ordering::SeqCst);
    }

    pub fn vanish_after_lookup(&self, vanish: bool) {
        self.vanish_after_lookup.store(vanish, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    fn check_lookup(&self) -> Result<()> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(anyhow!("database unavailable").into());
        }
        Ok(())
    }
}

#[async_trait]
impl Lockable for DomainRepo {
    type Entity = Domain;
    type Id = String;
    type Criteria = String;

    fn lock_client(&self) -> &LockClient {
        &self.client
    }

    fn get_obj_id(&self, obj: &Domain) -> String {
        obj.id.clone()
    }

    async fn get_obj_by_id(&self, id: &String) -> Result<Option<Domain>> {
        self.check_lookup()?;
        Ok(self.rows.get(id).map(|row| row.clone()))
    }

    async fn get_obj(&self, name: &String) -> Result<Option<Domain>> {
        self.check_lookup()?;
        let found = self
            .rows
            .iter()
            .find(|row| &row.name == name)
            .map(|row| row.clone());
        if let Some(domain) = &found
            && self.vanish_after_lookup.load(Ordering::SeqCst)
        {
            self.rows.remove(&domain.id);
        }
        Ok(found)
    }

    async fn create_obj(&self, name: &String) -> Result<Domain> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("insert rejected").into());
        }
        if self.panic_on_create.load(Ordering::SeqCst) {
            panic!("insert panicked");
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        Ok(self.insert(name))
    }
}

/// Repository with no criteria lookup or creation
pub struct IdOnlyRepo {
    pub client: LockClient,
}

#[async_trait]
impl Lockable for IdOnlyRepo {
    type Entity = Domain;
    type Id = String;
    type Criteria = ();

    fn type_name(&self) -> &str {
        "IdOnly"
    }

    fn lock_client(&self) -> &LockClient {
        &self.client
    }

    fn get_obj_id(&self, obj: &Domain) -> String {
        obj.id.clone()
    }

    async fn get_obj_by_id(&self, _id: &String) -> Result<Option<Domain>> {
        Ok(None)
    }
}

/// Whether `key` can be taken right now by a fresh holder
pub async fn is_free(store: &dyn LockStore, key: &str) -> bool {
    let mut lock = store.lock(key, LEASE);
    match lock.acquire(AcquireOptions::non_blocking()).await {
        Ok(true) => {
            let _ = lock.release().await;
            true
        }
        _ => false,
    }
}

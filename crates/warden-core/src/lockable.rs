//! Resource locking protocol
//!
//! An entity repository implements [`Lockable`] to say how objects are
//! identified, looked up and created. In return it gets lock keys namespaced by
//! its type name and [`Lockable::get_locked_obj`], which hands back an object
//! together with its held object lock.
//!
//! Lookups by criteria run under a per-type class lock so that two callers can
//! never both decide an object is missing and create it twice. The class lock is
//! traded for the object lock before returning and is never exposed.
//!
//! ```ignore
//! struct Patients { client: LockClient, db: PatientDb }
//!
//! #[async_trait]
//! impl Lockable for Patients {
//!     type Entity = Patient;
//!     type Id = String;
//!     type Criteria = String;
//!
//!     fn lock_client(&self) -> &LockClient { &self.client }
//!     fn get_obj_id(&self, obj: &Patient) -> String { obj.id.clone() }
//!     async fn get_obj_by_id(&self, id: &String) -> Result<Option<Patient>> { .. }
//!     async fn get_obj(&self, patient_id: &String) -> Result<Option<Patient>> { .. }
//!     async fn create_obj(&self, patient_id: &String) -> Result<Patient> { .. }
//! }
//!
//! let (patient, lock) = patients
//!     .get_locked_obj(LockedObjQuery::criteria("pid-1234".to_string()).create(true))
//!     .await?
//!     .into_parts();
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use warden_common::{CLASS_LOCK_PREFIX, LockError, OBJECT_LOCK_PREFIX, Result};
use warden_consistency::{AcquireOptions, Lock};

use crate::client::LockClient;
use crate::handle::{InFlight, acquire_lock, release_after_failure, release_lock};
use crate::manager::LockManager;

/// Arguments of [`Lockable::get_locked_obj`]
#[derive(Debug, Clone)]
pub struct LockedObjQuery<I, C> {
    /// Look the object up by id under its object lock only
    pub id: Option<I>,
    /// Lookup and creation arguments
    pub criteria: C,
    /// Create the object when it does not exist
    pub create: bool,
    pub degrade_gracefully: bool,
}

impl<I, C> LockedObjQuery<I, C> {
    pub fn criteria(criteria: C) -> Self {
        Self {
            id: None,
            criteria,
            create: false,
            degrade_gracefully: false,
        }
    }

    pub fn by_id(id: I, criteria: C) -> Self {
        Self {
            id: Some(id),
            ..Self::criteria(criteria)
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn degrade_gracefully(mut self, degrade_gracefully: bool) -> Self {
        self.degrade_gracefully = degrade_gracefully;
        self
    }
}

impl<I> LockedObjQuery<I, ()> {
    pub fn id(id: I) -> Self {
        Self::by_id(id, ())
    }
}

/// Capability of an entity repository to lock its objects
#[async_trait]
pub trait Lockable: Send + Sync {
    type Entity: Send + Sync + 'static;
    type Id: fmt::Display + Clone + Send + Sync + 'static;
    type Criteria: Send + Sync + 'static;

    /// Namespace of this type's lock keys; must not contain `-`
    fn type_name(&self) -> &str {
        short_type_name::<Self::Entity>()
    }

    fn lock_client(&self) -> &LockClient;

    fn get_obj_id(&self, obj: &Self::Entity) -> Self::Id;

    async fn get_obj_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;

    /// Look an object up by criteria, e.g. a secondary index
    async fn get_obj(&self, criteria: &Self::Criteria) -> Result<Option<Self::Entity>> {
        let _ = criteria;
        Err(LockError::not_implemented("get_obj", self.type_name()))
    }

    async fn create_obj(&self, criteria: &Self::Criteria) -> Result<Self::Entity> {
        let _ = criteria;
        Err(LockError::not_implemented("create_obj", self.type_name()))
    }

    fn obj_lock_key(&self, id: &Self::Id) -> String {
        format!("{}-{}-{}", OBJECT_LOCK_PREFIX, self.type_name(), id)
    }

    fn class_lock_key(&self) -> String {
        format!("{}-{}", CLASS_LOCK_PREFIX, self.type_name())
    }

    fn get_obj_lock(&self, obj: &Self::Entity, lease: Duration) -> Lock {
        self.get_obj_lock_by_id(&self.get_obj_id(obj), lease)
    }

    fn get_obj_lock_by_id(&self, id: &Self::Id, lease: Duration) -> Lock {
        self.lock_client().lock(&self.obj_lock_key(id), lease)
    }

    fn get_class_lock(&self, lease: Duration) -> Lock {
        self.lock_client().lock(&self.class_lock_key(), lease)
    }

    /// Re-read `obj` from the store
    async fn get_latest_obj(&self, obj: &Self::Entity) -> Result<Option<Self::Entity>> {
        let id = self.get_obj_id(obj);
        self.get_obj_by_id(&id).await
    }

    /// Find (and optionally create) an object and return it with its lock held.
    ///
    /// Returns an empty manager when the object does not exist and `create`
    /// is off; no lock is left held in that case or on any error.
    async fn get_locked_obj(
        &self,
        query: LockedObjQuery<Self::Id, Self::Criteria>,
    ) -> Result<LockManager<Self::Entity>> {
        let LockedObjQuery {
            id,
            criteria,
            create,
            degrade_gracefully,
        } = query;

        match id {
            Some(id) => lock_by_id(self, id, criteria, create, degrade_gracefully).await,
            None => lock_by_criteria(self, criteria, create, degrade_gracefully).await,
        }
    }
}

async fn find_or_create<L: Lockable + ?Sized>(
    repo: &L,
    id: Option<&L::Id>,
    criteria: &L::Criteria,
    create: bool,
) -> Result<Option<L::Entity>> {
    let found = match id {
        Some(id) => repo.get_obj_by_id(id).await?,
        None => repo.get_obj(criteria).await?,
    };

    match found {
        Some(obj) => Ok(Some(obj)),
        None if create => {
            let obj = repo.create_obj(criteria).await?;
            debug!(
                type_name = %repo.type_name(),
                id = %repo.get_obj_id(&obj),
                "Created locked object"
            );
            Ok(Some(obj))
        }
        None => Ok(None),
    }
}

/// The id is known, so there is no creation race and no class lock
async fn lock_by_id<L: Lockable + ?Sized>(
    repo: &L,
    id: L::Id,
    criteria: L::Criteria,
    create: bool,
    degrade_gracefully: bool,
) -> Result<LockManager<L::Entity>> {
    let lease = repo.lock_client().config().object_lease();
    let mut lock = InFlight::new(
        acquire_lock(
            repo.get_obj_lock_by_id(&id, lease),
            degrade_gracefully,
            AcquireOptions::blocking(),
        )
        .await?,
    );

    let obj = match find_or_create(repo, Some(&id), &criteria, create).await {
        Ok(obj) => obj,
        Err(err) => {
            release_after_failure(lock.take(), degrade_gracefully).await;
            return Err(err);
        }
    };

    match obj {
        Some(obj) => Ok(LockManager::new(Some(obj), lock.take())),
        None => {
            release_lock(lock.take(), degrade_gracefully).await?;
            Ok(LockManager::empty())
        }
    }
}

async fn lock_by_criteria<L: Lockable + ?Sized>(
    repo: &L,
    criteria: L::Criteria,
    create: bool,
    degrade_gracefully: bool,
) -> Result<LockManager<L::Entity>> {
    let config = repo.lock_client().config();
    let mut class_lock = InFlight::new(
        acquire_lock(
            repo.get_class_lock(config.class_lease()),
            degrade_gracefully,
            AcquireOptions::blocking(),
        )
        .await?,
    );

    let obj = match find_or_create(repo, None, &criteria, create).await {
        Ok(obj) => obj,
        Err(err) => {
            release_after_failure(class_lock.take(), degrade_gracefully).await;
            return Err(err);
        }
    };

    let Some(obj) = obj else {
        release_lock(class_lock.take(), degrade_gracefully).await?;
        return Ok(LockManager::empty());
    };

    let acquired = acquire_lock(
        repo.get_obj_lock(&obj, config.object_lease()),
        degrade_gracefully,
        AcquireOptions::blocking(),
    )
    .await;
    let mut obj_lock = match acquired {
        Ok(lock) => InFlight::new(lock),
        Err(err) => {
            release_after_failure(class_lock.take(), degrade_gracefully).await;
            return Err(err);
        }
    };

    // Another holder of the object lock may have changed it since the lookup
    let latest = match repo.get_latest_obj(&obj).await {
        Ok(latest) => latest,
        Err(err) => {
            release_after_failure(obj_lock.take(), degrade_gracefully).await;
            release_after_failure(class_lock.take(), degrade_gracefully).await;
            return Err(err);
        }
    };

    if let Err(err) = release_lock(class_lock.take(), degrade_gracefully).await {
        release_after_failure(obj_lock.take(), degrade_gracefully).await;
        return Err(err);
    }

    match latest {
        Some(latest) => Ok(LockManager::new(Some(latest), obj_lock.take())),
        None => {
            // Deleted between lookup and re-read
            release_lock(obj_lock.take(), degrade_gracefully).await?;
            Ok(LockManager::empty())
        }
    }
}

/// Last path segment of a type name, without generic arguments
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

//! Cached property reads
//!
//! Reads a single property of a stored record through a TTL cache, checking
//! that the record is of the expected type first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use warden_common::{LockConfig, LockError, Result};

/// Raw record lookup by id
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get_raw(&self, id: &str) -> Result<Option<Value>>;
}

/// Check the record's `doc_type`, or its `base_doc` for subtypes, against `expected`
pub fn check_doc_type(expected: &str, doc: &Value) -> Result<()> {
    let tag = |field: &str| doc.get(field).and_then(Value::as_str);
    if tag("doc_type") == Some(expected) || tag("base_doc") == Some(expected) {
        return Ok(());
    }
    Err(LockError::IncompatibleEntity {
        expected: expected.to_string(),
        found: tag("doc_type").unwrap_or("<none>").to_string(),
    })
}

#[derive(Clone)]
pub struct PropertyCache {
    source: Arc<dyn DocumentSource>,
    cache: Cache<String, Value>,
}

impl PropertyCache {
    pub fn new(source: Arc<dyn DocumentSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn with_config(source: Arc<dyn DocumentSource>, config: &LockConfig) -> Self {
        Self::new(source, config.property_cache_ttl())
    }

    fn cache_key(doc_type: &str, id: &str, property: &str) -> String {
        format!("{}:{}:{}", doc_type, id, property)
    }

    /// Property `property` of record `id`, which must be a `doc_type`.
    ///
    /// Returns `None` when the record or the property does not exist; misses
    /// are not cached.
    pub async fn get_property(
        &self,
        doc_type: &str,
        id: &str,
        property: &str,
    ) -> Result<Option<Value>> {
        let key = Self::cache_key(doc_type, id, property);
        if let Some(value) = self.cache.get(&key).await {
            return Ok(Some(value));
        }

        let Some(doc) = self.source.get_raw(id).await? else {
            debug!(doc_type, id, "Record not found for cached property read");
            return Ok(None);
        };
        check_doc_type(doc_type, &doc)?;

        let Some(value) = doc.get(property).cloned() else {
            return Ok(None);
        };
        self.cache.insert(key, value.clone()).await;
        Ok(Some(value))
    }

    /// Typed variant of [`get_property`](Self::get_property)
    pub async fn get_property_as<T: DeserializeOwned>(
        &self,
        doc_type: &str,
        id: &str,
        property: &str,
    ) -> Result<Option<T>> {
        match self.get_property(doc_type, id, property).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| LockError::Entity(e.into())),
            None => Ok(None),
        }
    }

    pub async fn invalidate(&self, doc_type: &str, id: &str, property: &str) {
        self.cache
            .invalidate(&Self::cache_key(doc_type, id, property))
            .await;
    }
}

impl fmt::Debug for PropertyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCache")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct CountingSource {
        docs: HashMap<String, Value>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for CountingSource {
        async fn get_raw(&self, id: &str) -> Result<Option<Value>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.docs.get(id).cloned())
        }
    }

    fn source() -> Arc<CountingSource> {
        let mut docs = HashMap::new();
        docs.insert(
            "p1".to_string(),
            json!({"doc_type": "Patient", "name": "Ada", "age": 36}),
        );
        docs.insert(
            "p2".to_string(),
            json!({"doc_type": "Infant", "base_doc": "Patient", "name": "Bo"}),
        );
        docs.insert("c1".to_string(), json!({"doc_type": "Clinic", "name": "North"}));
        Arc::new(CountingSource {
            docs,
            ..Default::default()
        })
    }

    #[test]
    fn test_check_doc_type() {
        assert!(check_doc_type("Patient", &json!({"doc_type": "Patient"})).is_ok());
        let subtype = json!({"doc_type": "Infant", "base_doc": "Patient"});
        assert!(check_doc_type("Patient", &subtype).is_ok());

        let err = check_doc_type("Patient", &json!({"doc_type": "Clinic"})).unwrap_err();
        assert!(matches!(
            err,
            LockError::IncompatibleEntity { ref expected, ref found }
                if expected == "Patient" && found == "Clinic"
        ));
    }

    #[tokio::test]
    async fn test_property_is_cached() {
        let source = source();
        let cache = PropertyCache::new(source.clone(), Duration::from_secs(60));

        let name = cache.get_property("Patient", "p1", "name").await.unwrap();
        assert_eq!(name, Some(json!("Ada")));
        let name = cache.get_property("Patient", "p1", "name").await.unwrap();
        assert_eq!(name, Some(json!("Ada")));
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        cache.invalidate("Patient", "p1", "name").await;
        cache.get_property("Patient", "p1", "name").await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_typed_and_missing() {
        let cache = PropertyCache::with_config(source(), &LockConfig::default());

        let age: Option<u32> = cache.get_property_as("Patient", "p1", "age").await.unwrap();
        assert_eq!(age, Some(36));
        assert_eq!(cache.get_property("Patient", "p1", "missing").await.unwrap(), None);
        assert_eq!(cache.get_property("Patient", "nope", "name").await.unwrap(), None);

        // Subtype through base_doc
        let name = cache.get_property("Patient", "p2", "name").await.unwrap();
        assert_eq!(name, Some(json!("Bo")));
    }

    #[tokio::test]
    async fn test_incompatible_record() {
        let cache = PropertyCache::new(source(), Duration::from_secs(60));
        let err = cache.get_property("Patient", "c1", "name").await.unwrap_err();
        assert!(matches!(err, LockError::IncompatibleEntity { .. }));
    }
}

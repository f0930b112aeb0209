use std::sync::Arc;

use tracing::info;
use warden_consistency::{LockStore, MemoryLockStore};

use crate::config::{Settings, StoreBackend};

/// Build the configured lock store
pub async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn LockStore>> {
    match settings.store.backend {
        StoreBackend::Memory => {
            info!("Using in-process memory lock store");
            let store = MemoryLockStore::new().with_cleanup(settings.store.cleanup_interval());
            Ok(Arc::new(store))
        }
        #[cfg(feature = "redis")]
        StoreBackend::Redis => {
            let store = warden_consistency::RedisLockStore::connect(
                &settings.store.redis_url,
                settings.lock.retry_interval(),
            )
            .await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StoreBackend::Redis => {
            anyhow::bail!("store.backend = \"redis\" requires building with the `redis` feature")
        }
    }
}

//! Redis lock store
//!
//! Each lock is a Redis string holding the owner token, written with
//! `SET key token NX PX lease` and removed by a compare-and-delete script so a
//! holder whose lease expired can never delete a successor's lock.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::time::Instant;
use tracing::{debug, info};
use warden_common::{LockError, Result};

use super::model::AcquireOptions;
use super::store::{Lock, LockHandle, LockStore};

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
end
return 0
"#;

/// Lock store backed by a single Redis instance
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    retry_interval: Duration,
}

impl RedisLockStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1/`)
    pub async fn connect(url: &str, retry_interval: Duration) -> Result<Self> {
        let client = redis::Client::open(url).map_err(store_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(store_error)?;
        info!(url = %url, "Connected to redis lock store");
        Ok(Self::with_connection(conn, retry_interval))
    }

    pub fn with_connection(conn: ConnectionManager, retry_interval: Duration) -> Self {
        Self {
            conn,
            retry_interval,
        }
    }
}

impl LockStore for RedisLockStore {
    fn lock(&self, key: &str, lease: Duration) -> Lock {
        Box::new(RedisLock {
            conn: self.conn.clone(),
            key: key.to_string(),
            lease,
            token: uuid::Uuid::new_v4().to_string(),
            retry_interval: self.retry_interval,
        })
    }
}

/// Handle over one Redis key
pub struct RedisLock {
    conn: ConnectionManager,
    key: String,
    lease: Duration,
    token: String,
    retry_interval: Duration,
}

impl fmt::Debug for RedisLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisLock")
            .field("key", &self.key)
            .field("lease", &self.lease)
            .field("token", &self.token)
            .finish()
    }
}

impl RedisLock {
    async fn try_set(&mut self) -> Result<bool> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(self.lease.as_millis().max(1) as u64)
            .query_async(&mut self.conn)
            .await
            .map_err(store_error)?;
        Ok(reply.is_some())
    }
}

#[async_trait]
impl LockHandle for RedisLock {
    fn key(&self) -> &str {
        &self.key
    }

    fn lease(&self) -> Duration {
        self.lease
    }

    async fn acquire(&mut self, options: AcquireOptions) -> Result<bool> {
        let deadline = options.blocking_timeout.map(|timeout| Instant::now() + timeout);

        loop {
            if self.try_set().await? {
                debug!(key = %self.key, "Lock acquired");
                return Ok(true);
            }
            if !options.blocking {
                return Ok(false);
            }
            if let Some(deadline) = deadline
                && Instant::now() + self.retry_interval > deadline
            {
                return Ok(false);
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn release(&mut self) -> Result<()> {
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut self.conn)
            .await
            .map_err(store_error)?;

        if deleted == 0 {
            return Err(LockError::NotHeld(self.key.clone()));
        }
        debug!(key = %self.key, "Lock released");
        Ok(())
    }
}

fn store_error(err: redis::RedisError) -> LockError {
    LockError::StoreUnavailable(err.to_string())
}

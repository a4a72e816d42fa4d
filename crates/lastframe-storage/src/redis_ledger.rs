//! Redis ledger backend.
//!
//! One hash per scope, `lastframe:processed:<scope>`, mapping identity to the
//! JSON-encoded record. `HSETNX` gives first-write-wins without a round trip.

use async_trait::async_trait;
use lastframe_models::{ProcessedRecord, ResourceIdentity, SourceScope};
use redis::AsyncCommands;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::ledger::LedgerStore;

/// Ledger stored in a Redis hash.
pub struct RedisLedger {
    client: redis::Client,
    key: String,
}

impl RedisLedger {
    /// Create a ledger for `scope` on the Redis server at `redis_url`.
    pub fn new(redis_url: &str, scope: &SourceScope) -> StorageResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key: Self::key_for(scope),
        })
    }

    /// Create and verify the connection.
    pub async fn connect(redis_url: &str, scope: &SourceScope) -> StorageResult<Self> {
        let ledger = Self::new(redis_url, scope)?;
        let mut conn = ledger.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(scope = %scope, key = %ledger.key, "Connected Redis ledger");
        Ok(ledger)
    }

    /// Hash key holding the records of `scope`.
    pub fn key_for(scope: &SourceScope) -> String {
        format!("lastframe:processed:{}", scope)
    }
}

#[async_trait]
impl LedgerStore for RedisLedger {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn contains(&self, identity: &ResourceIdentity) -> StorageResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.hexists(&self.key, identity.as_str()).await?;
        Ok(exists)
    }

    async fn get(&self, identity: &ResourceIdentity) -> StorageResult<Option<ProcessedRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.hget(&self.key, identity.as_str()).await?;
        payload
            .map(|p| serde_json::from_str::<ProcessedRecord>(&p).map_err(StorageError::from))
            .transpose()
    }

    async fn insert_if_absent(&self, record: &ProcessedRecord) -> StorageResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        let inserted: bool = conn
            .hset_nx(&self.key, record.identity.as_str(), payload)
            .await?;
        Ok(inserted)
    }

    async fn len(&self) -> StorageResult<usize> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: usize = conn.hlen(&self.key).await?;
        Ok(len)
    }
}

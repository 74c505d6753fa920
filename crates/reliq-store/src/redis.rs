use crate::{Result, Store, StoreError};
use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use reliq_config::RedisConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis-backed store implementation.
///
/// All commands go through a multiplexed [`ConnectionManager`], which
/// reconnects transparently. [`Store::blocking_handle`] opens a second
/// manager so `BRPOPLPUSH` cannot starve the command traffic sharing the
/// primary connection.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    config: RedisConfig,
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Create a new Redis store instance
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        info!("Connecting to Redis at {}", config.url);

        let client = Client::open(config.url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            StoreError::connection(format!("Failed to create Redis client: {e}"))
        })?;

        let connection_manager =
            Self::manager(&client, config.connect_timeout, config.command_timeout).await?;

        info!("Successfully connected to Redis");

        Ok(Self {
            client,
            config: config.clone(),
            connection_manager,
        })
    }

    /// Get a cloned connection manager
    pub fn connection_manager(&self) -> ConnectionManager {
        self.connection_manager.clone()
    }

    async fn manager(
        client: &Client,
        connect_timeout: Option<Duration>,
        response_timeout: Option<Duration>,
    ) -> Result<ConnectionManager> {
        let mut manager_config = ConnectionManagerConfig::new();
        if let Some(timeout) = connect_timeout {
            manager_config = manager_config.set_connection_timeout(timeout);
        }
        if let Some(timeout) = response_timeout {
            manager_config = manager_config.set_response_timeout(timeout);
        }

        ConnectionManager::new_with_config(client.clone(), manager_config)
            .await
            .map_err(|e| {
                error!("Failed to create Redis connection manager: {}", e);
                StoreError::connection(format!("Failed to create Redis connection manager: {e}"))
            })
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection_manager.clone();
        let result: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| StoreError::query(format!("Failed to get key '{key}': {e}")))?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        debug!("Setting key: {} (TTL: {:?})", key, ttl);

        let mut conn = self.connection_manager.clone();
        match ttl {
            Some(duration) => {
                let _: () = conn
                    .set_ex(key, value, duration.as_secs())
                    .await
                    .map_err(|e| {
                        StoreError::query(format!("Failed to set key '{key}' with TTL: {e}"))
                    })?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .map_err(|e| StoreError::query(format!("Failed to set key '{key}': {e}")))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        debug!("Deleting key: {}", key);

        let mut conn = self.connection_manager.clone();
        let deleted: u32 = conn
            .del(key)
            .await
            .map_err(|e| StoreError::query(format!("Failed to delete key '{key}': {e}")))?;
        Ok(deleted > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        debug!("Adding member to set '{}'", key);

        let mut conn = self.connection_manager.clone();
        let added: i64 = conn
            .sadd(key, member)
            .await
            .map_err(|e| StoreError::query(format!("Failed to add to set '{key}': {e}")))?;
        Ok(added > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let members: Vec<String> = conn
            .smembers(key)
            .await
            .map_err(|e| StoreError::query(format!("Failed to read set '{key}': {e}")))?;
        Ok(members)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        debug!("Pushing onto list '{}'", key);

        let mut conn = self.connection_manager.clone();
        let _: i64 = conn
            .lpush(key, value)
            .await
            .map_err(|e| StoreError::query(format!("Failed to push to list '{key}': {e}")))?;
        Ok(())
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let entries: Vec<String> = conn
            .lrange(key, 0, -1)
            .await
            .map_err(|e| StoreError::query(format!("Failed to read list '{key}': {e}")))?;
        Ok(entries)
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.connection_manager.clone();
        let removed: i64 = conn
            .lrem(key, 0, value)
            .await
            .map_err(|e| StoreError::query(format!("Failed to remove from list '{key}': {e}")))?;
        Ok(removed as usize)
    }

    async fn pop_push(&self, source: &str, destination: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn.rpoplpush(source, destination).await.map_err(|e| {
            StoreError::query(format!("Failed to pop from '{source}' to '{destination}': {e}"))
        })?;
        Ok(value)
    }

    async fn blocking_pop_push(
        &self,
        source: &str,
        destination: &str,
        timeout: Duration,
    ) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn
            .brpoplpush(source, destination, timeout.as_secs_f64())
            .await
            .map_err(|e| {
                StoreError::query(format!(
                    "Failed blocking pop from '{source}' to '{destination}': {e}"
                ))
            })?;
        Ok(value)
    }

    async fn decrement(&self, key: &str) -> Result<i64> {
        let mut conn = self.connection_manager.clone();
        let new_value: i64 = conn
            .decr(key, 1)
            .await
            .map_err(|e| StoreError::query(format!("Failed to decrement key '{key}': {e}")))?;
        debug!("Key '{}' decremented to {}", key, new_value);
        Ok(new_value)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| StoreError::query(format!("Redis ping failed: {e}")))?;
        Ok(())
    }

    async fn blocking_handle(&self) -> Result<Arc<dyn Store>> {
        // No response timeout here: this handle parks on BRPOPLPUSH for
        // as long as the queue stays empty.
        let connection_manager =
            Self::manager(&self.client, self.config.connect_timeout, None).await?;

        Ok(Arc::new(Self {
            client: self.client.clone(),
            config: self.config.clone(),
            connection_manager,
        }))
    }
}

//! The shared wallet-queue backend: a cross-process FIFO of available
//! executor wallet addresses, used when multiple bundler instances share one
//! fleet of executor private keys.
//!
//! The trait's primitives mirror the underlying Redis list commands
//! directly (`LLEN`, `RPOP`, `RPUSH`, `LPUSH`); pushing with `LPUSH` and
//! popping with `RPOP` gives FIFO ordering across however many bundler
//! processes share the list.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use super::error::SenderError;

#[async_trait]
pub trait SharedWalletBackend: Send + Sync {
    async fn llen(&self, key: &str) -> Result<usize, SenderError>;
    async fn rpop(&self, key: &str) -> Result<Option<String>, SenderError>;
    async fn rpush(&self, key: &str, value: &str) -> Result<(), SenderError>;
    async fn lpush(&self, key: &str, value: &str) -> Result<(), SenderError>;
}

/// Redis-list-backed implementation, used when `redisQueueEndpoint` is
/// configured.
pub struct RedisWalletBackend {
    connection: Mutex<ConnectionManager>,
}

impl RedisWalletBackend {
    pub async fn connect(endpoint: &str) -> Result<Self, SenderError> {
        let client = redis::Client::open(endpoint)?;
        let connection = client.get_connection_manager().await?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }
}

#[async_trait]
impl SharedWalletBackend for RedisWalletBackend {
    async fn llen(&self, key: &str) -> Result<usize, SenderError> {
        let mut conn = self.connection.lock().await;
        Ok(conn.llen(key).await?)
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, SenderError> {
        let mut conn = self.connection.lock().await;
        Ok(conn.rpop(key, None).await?)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), SenderError> {
        let mut conn = self.connection.lock().await;
        conn.rpush(key, value).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), SenderError> {
        let mut conn = self.connection.lock().await;
        conn.lpush(key, value).await?;
        Ok(())
    }
}

/// In-memory stand-in for [`RedisWalletBackend`], so the shared-queue code
/// path runs in tests without a live Redis instance.
#[derive(Default)]
pub struct LocalWalletBackend {
    lists: Mutex<std::collections::HashMap<String, VecDeque<String>>>,
}

#[async_trait]
impl SharedWalletBackend for LocalWalletBackend {
    async fn llen(&self, key: &str) -> Result<usize, SenderError> {
        let lists = self.lists.lock().await;
        Ok(lists.get(key).map(VecDeque::len).unwrap_or(0))
    }

    async fn rpop(&self, key: &str) -> Result<Option<String>, SenderError> {
        let mut lists = self.lists.lock().await;
        Ok(lists.get_mut(key).and_then(VecDeque::pop_back))
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<(), SenderError> {
        let mut lists = self.lists.lock().await;
        lists.entry(key.to_string()).or_default().push_back(value.to_string());
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), SenderError> {
        let mut lists = self.lists.lock().await;
        lists.entry(key.to_string()).or_default().push_front(value.to_string());
        Ok(())
    }
}

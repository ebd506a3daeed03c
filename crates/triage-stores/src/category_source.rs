//! CategorySource implementations - read access to the cached category tree

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use redis::AsyncCommands;

use triage_core::store::{CategorySource, StoreError};

/// In-memory implementation for development and testing
pub struct InMemoryCategorySource {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryCategorySource {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Source holding a single cached value.
    pub fn with_entry(key: impl Into<String>, value: impl Into<String>) -> Self {
        let source = Self::new();
        if let Ok(mut entries) = source.entries.write() {
            entries.insert(key.into(), value.into());
        }
        source
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        entries.insert(key.into(), value.into());
        Ok(())
    }
}

impl Default for InMemoryCategorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CategorySource for InMemoryCategorySource {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }
}

/// Redis string cache lookup (`GET key`).
pub struct RedisCategorySource {
    client: redis::Client,
}

impl RedisCategorySource {
    pub fn new(connection_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CategorySource for RedisCategorySource {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.get(key)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

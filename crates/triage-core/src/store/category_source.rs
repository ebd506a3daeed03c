//! CategorySource - read access to the category cache

use std::sync::Arc;

use async_trait::async_trait;

use super::StoreError;

/// Key/value lookup returning the JSON-encoded category tree.
#[async_trait]
pub trait CategorySource: Send + Sync {
    /// Raw value stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
impl CategorySource for Arc<dyn CategorySource> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }
}

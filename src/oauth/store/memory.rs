//! Process-local token store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{TokenStore, TokenStoreKey};
use crate::error::Result;
use crate::oauth::records::TokenRecord;

/// In-memory [`TokenStore`]; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    records: RwLock<HashMap<TokenStoreKey, TokenRecord>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns `true` when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get(&self, key: &TokenStoreKey) -> Result<Option<TokenRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &TokenStoreKey, record: TokenRecord) -> Result<()> {
        self.records.write().await.insert(key.clone(), record);
        Ok(())
    }

    async fn delete(&self, key: &TokenStoreKey) -> Result<()> {
        self.records.write().await.remove(key);
        Ok(())
    }
}

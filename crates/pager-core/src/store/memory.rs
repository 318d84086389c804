use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{store::KvBackend, Result};

/// Process-local backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.records.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.records.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.records.lock().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

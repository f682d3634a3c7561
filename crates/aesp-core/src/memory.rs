//! A reference [`Storage`] implementation backed by an in-memory map. Good
//! enough to exercise every subsystem in tests and small embeddings; it
//! carries no durability guarantee and is not meant for production hosts,
//! which are expected to supply their own `Storage` over whatever database
//! they already run.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::capability::Storage;
use crate::error::AespError;

#[derive(Default)]
pub struct MemoryStorage {
    data: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, AespError> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), AespError> {
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AespError> {
        self.data.lock().await.remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>, AespError> {
        let data = self.data.lock().await;
        Ok(match prefix {
            Some(p) => data.keys().filter(|k| k.starts_with(p)).cloned().collect(),
            None => data.keys().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let s = MemoryStorage::new();
        s.set("aesp:policies", json!({"a": 1})).await.unwrap();
        let v = s.get("aesp:policies").await.unwrap();
        assert_eq!(v, Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let s = MemoryStorage::new();
        assert_eq!(s.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_removes() {
        let s = MemoryStorage::new();
        s.set("k", json!(1)).await.unwrap();
        s.delete("k").await.unwrap();
        assert_eq!(s.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn keys_filters_by_prefix() {
        let s = MemoryStorage::new();
        s.set("aesp:policies", json!(1)).await.unwrap();
        s.set("aesp:audit", json!(1)).await.unwrap();
        s.set("other", json!(1)).await.unwrap();
        let mut ks = s.keys(Some("aesp:")).await.unwrap();
        ks.sort();
        assert_eq!(ks, vec!["aesp:audit".to_string(), "aesp:policies".to_string()]);
    }
}

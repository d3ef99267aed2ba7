use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{ObjectStore, StorageError, validate_key};

/// In-memory object store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with the given prefix, ascending. Test helper for asserting
    /// chunk cleanup after assembly.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let objects = self.objects.read().unwrap();
        let mut keys: Vec<String> = objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects.write().unwrap().insert(key.into(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.objects
            .read()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.into()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.objects.write().unwrap().remove(key);
        Ok(())
    }

    async fn compose(&self, sources: &[String], dest: &str) -> Result<u64, StorageError> {
        validate_key(dest)?;
        let mut assembled = Vec::new();
        {
            let objects = self.objects.read().unwrap();
            for source in sources {
                let bytes = objects
                    .get(source)
                    .ok_or_else(|| StorageError::NotFound(source.clone()))?;
                assembled.extend_from_slice(bytes);
            }
        }
        let total = assembled.len() as u64;
        self.objects.write().unwrap().insert(dest.into(), assembled);
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryStore::new();
        store.put("a/b", b"hello".to_vec()).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), b"hello");

        store.delete("a/b").await.unwrap();
        assert!(matches!(
            store.get("a/b").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_missing_is_noop() {
        let store = MemoryStore::new();
        store.delete("never/there").await.unwrap();
    }

    #[tokio::test]
    async fn compose_concatenates_in_order() {
        let store = MemoryStore::new();
        store.put("c/0", b"AA".to_vec()).await.unwrap();
        store.put("c/1", b"BB".to_vec()).await.unwrap();
        store.put("c/2", b"C".to_vec()).await.unwrap();

        let total = store
            .compose(
                &["c/0".into(), "c/1".into(), "c/2".into()],
                "out/assembled",
            )
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(store.get("out/assembled").await.unwrap(), b"AABBC");
        // Sources stay in place.
        assert_eq!(store.get("c/0").await.unwrap(), b"AA");
    }

    #[tokio::test]
    async fn compose_fails_on_missing_source() {
        let store = MemoryStore::new();
        store.put("c/0", b"AA".to_vec()).await.unwrap();
        let result = store.compose(&["c/0".into(), "c/1".into()], "out").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn keys_with_prefix_sorted() {
        let store = MemoryStore::new();
        store.put("u/s1/1", vec![1]).await.unwrap();
        store.put("u/s1/0", vec![0]).await.unwrap();
        store.put("u/s2/0", vec![2]).await.unwrap();
        assert_eq!(store.keys_with_prefix("u/s1/"), vec!["u/s1/0", "u/s1/1"]);
    }
}

#[cfg(test)]
mod tests {
    use crate::BucketStore;
    use relay_core::storage::MemoryConfig;
    use relay_core::{BlobStore, StorageConfig, StoreError};

    fn memory_store(root: &str) -> BucketStore {
        BucketStore::new(&StorageConfig::Memory(MemoryConfig {
            root: root.to_string(),
        }))
        .expect("create memory store")
    }

    /// Test: Memory backend basic put/get/head operations
    ///
    /// Purpose
    /// - Validate object storage and retrieval using the in-memory backend
    ///
    /// Expected
    /// - Get returns the exact bytes written, head reports the byte length
    #[tokio::test]
    async fn test_memory_backend_put_get() {
        let store = memory_store("destination");
        assert_eq!(store.id(), "destination");

        let meta = store
            .put("project.txt", b"hello world".to_vec())
            .await
            .expect("put object");
        assert_eq!(meta.size, 11);

        let retrieved = store.get("project.txt").await.expect("get object");
        assert_eq!(retrieved, b"hello world");
        assert_eq!(store.head("project.txt").await.expect("head").size, 11);
    }

    /// Test: put is a full overwrite
    ///
    /// Expected
    /// - Writing a shorter body under an existing key leaves only the new bytes
    #[tokio::test]
    async fn test_put_overwrites() {
        let store = memory_store("destination");
        store.put("a", vec![b'x'; 64]).await.expect("first put");
        store.put("a", vec![b'y'; 4]).await.expect("second put");

        assert_eq!(store.get("a").await.expect("get"), b"yyyy");
    }

    /// Test: list returns every object with its size, keys stripped of the root prefix
    #[tokio::test]
    async fn test_list_nested_keys() {
        let store = memory_store("bucket");
        store.put("temp.txt", vec![0; 3]).await.expect("put");
        store.put("dir/nested/data.bin", vec![0; 5]).await.expect("put");

        let listed = store.list().await.expect("list");
        let keys: Vec<(&str, u64)> = listed.iter().map(|o| (o.key.as_str(), o.size)).collect();
        assert_eq!(keys, vec![("dir/nested/data.bin", 5), ("temp.txt", 3)]);
    }

    /// Test: listing an empty store
    #[tokio::test]
    async fn test_list_empty() {
        let store = memory_store("empty");
        assert!(store.list().await.expect("list").is_empty());
    }

    /// Test: delete semantics
    ///
    /// Expected
    /// - Deleting an existing key removes it
    /// - Deleting an absent key succeeds
    /// - Reading a deleted key reports NotFound
    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = memory_store("destination");
        store.put("gone.txt", vec![1, 2, 3]).await.expect("put");

        store.delete("gone.txt").await.expect("delete");
        store.delete("gone.txt").await.expect("second delete");
        store.delete("never-existed").await.expect("delete absent");

        assert!(matches!(
            store.get("gone.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    /// Test: two memory stores do not share objects
    #[tokio::test]
    async fn test_memory_stores_are_isolated() {
        let source = memory_store("source");
        let destination = memory_store("destination");
        source.put("only-in-source", vec![1]).await.expect("put");

        assert!(destination.list().await.expect("list").is_empty());
    }
}

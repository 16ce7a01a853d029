use relay_core::storage::FsConfig;
use relay_core::{BlobStore, StorageConfig};
use relay_store::BucketStore;

/// Test: Filesystem backend object storage
///
/// Purpose
/// - Validate the fs backend stores objects to and reads them from disk
///
/// Flow
/// - Create a temporary directory and a store rooted there (file:// form)
/// - Put, list, get and delete objects
///
/// Expected
/// - Bytes survive the round trip and are visible on disk
/// - Delete removes the file; deleting again is a no-op
#[tokio::test]
async fn test_fs_backend_lifecycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = format!("file://{}", dir.path().display());
    let store = BucketStore::new(&StorageConfig::Fs(FsConfig { root })).expect("fs store");

    store
        .put("reports/temp.txt", vec![b'x'; 1024])
        .await
        .expect("put");
    assert!(dir.path().join("reports/temp.txt").exists());

    let listed = store.list().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].key, "reports/temp.txt");
    assert_eq!(listed[0].size, 1024);

    assert_eq!(store.get("reports/temp.txt").await.expect("get").len(), 1024);

    store.delete("reports/temp.txt").await.expect("delete");
    store.delete("reports/temp.txt").await.expect("delete again");
    assert!(store.list().await.expect("list").is_empty());
}

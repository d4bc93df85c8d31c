//! # cascade-store
//!
//! Object store interface for workload artifacts (payloads, results, and
//! status markers).
//!
//! The store is an external durable service; this crate defines the seam
//! the dispatcher talks through plus an in-memory implementation used for
//! development and tests. Implementations must treat every key as
//! independent: the dispatcher only ever writes fresh keys (status markers
//! are presence-only and never mutated), so no cross-key atomicity is
//! required.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Object store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object exists at the key.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The backing service failed the operation.
    #[error("store backend error on {bucket}/{key}: {message}")]
    Backend {
        bucket: String,
        key: String,
        message: String,
    },
}

impl StoreError {
    /// Returns true if the error is a missing-object error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// A stored object: raw bytes plus the content type declared at put time.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Durable key/blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write an object. Overwrites any existing object at the key.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Read an object. Returns [`StoreError::NotFound`] for missing keys.
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

/// One recorded operation against a [`MemoryStore`]. Keys are recorded
/// without their bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Put(String),
    Delete(String),
}

#[derive(Default)]
struct MemoryStoreInner {
    objects: HashMap<(String, String), StoredObject>,
    ops: Vec<StoreOp>,
    fail_puts: Vec<String>,
    fail_gets: Vec<String>,
    fail_deletes: Vec<String>,
}

/// In-memory object store for development and tests.
///
/// Records every put/delete in order and supports failure injection by key
/// substring, so tests can simulate a store outage for one artifact kind
/// while the rest of the pipeline proceeds.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail subsequent `put` calls whose key contains the fragment.
    pub fn fail_puts_containing(&self, fragment: &str) {
        self.inner.lock().unwrap().fail_puts.push(fragment.into());
    }

    /// Fail subsequent `get` calls whose key contains the fragment.
    pub fn fail_gets_containing(&self, fragment: &str) {
        self.inner.lock().unwrap().fail_gets.push(fragment.into());
    }

    /// Fail subsequent `delete` calls whose key contains the fragment.
    pub fn fail_deletes_containing(&self, fragment: &str) {
        self.inner
            .lock()
            .unwrap()
            .fail_deletes
            .push(fragment.into());
    }

    /// Clear all injected failures, simulating an outage that healed.
    pub fn clear_failure_injection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_puts.clear();
        inner.fail_gets.clear();
        inner.fail_deletes.clear();
    }

    /// Returns true if an object exists at the key.
    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    /// Snapshot of an object's bytes, if present.
    pub fn object_bytes(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
    }

    /// All keys currently present in the bucket, unordered.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Every put/delete performed so far, in call order. Failed operations
    /// are not recorded.
    pub fn ops(&self) -> Vec<StoreOp> {
        self.inner.lock().unwrap().ops.clone()
    }

    /// Keys passed to `delete` so far, in call order.
    pub fn deleted_keys(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .ops
            .iter()
            .filter_map(|op| match op {
                StoreOp::Delete(key) => Some(key.clone()),
                StoreOp::Put(_) => None,
            })
            .collect()
    }
}

fn matches_any(key: &str, fragments: &[String]) -> bool {
    fragments.iter().any(|f| key.contains(f.as_str()))
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if matches_any(key, &inner.fail_puts) {
            return Err(StoreError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected put failure".to_string(),
            });
        }
        inner.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.map(str::to_string),
            },
        );
        inner.ops.push(StoreOp::Put(key.to_string()));
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let inner = self.inner.lock().unwrap();
        if matches_any(key, &inner.fail_gets) {
            return Err(StoreError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected get failure".to_string(),
            });
        }
        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if matches_any(key, &inner.fail_deletes) {
            return Err(StoreError::Backend {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: "injected delete failure".to_string(),
            });
        }
        inner
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        inner.ops.push(StoreOp::Delete(key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();

        store
            .put(
                "workloads",
                "a/b/payload",
                Bytes::from_static(b"hello"),
                Some("text/plain"),
            )
            .await
            .unwrap();

        let obj = store.get("workloads", "a/b/payload").await.unwrap();
        assert_eq!(obj.body.as_ref(), b"hello");
        assert_eq!(obj.content_type.as_deref(), Some("text/plain"));

        store.delete("workloads", "a/b/payload").await.unwrap();
        let err = store.get("workloads", "a/b/payload").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_buckets_are_isolated() {
        let store = MemoryStore::new();
        store
            .put("bucket-a", "k", Bytes::from_static(b"x"), None)
            .await
            .unwrap();

        assert!(store.contains("bucket-a", "k"));
        assert!(!store.contains("bucket-b", "k"));
        assert!(store.get("bucket-b", "k").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        store.delete("workloads", "never/written").await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_injection_by_fragment() {
        let store = MemoryStore::new();
        store.fail_puts_containing("status/completed");

        store
            .put("workloads", "r/status/in_progress", Bytes::new(), None)
            .await
            .unwrap();
        let err = store
            .put("workloads", "r/status/completed", Bytes::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend { .. }));
        assert!(!store.contains("workloads", "r/status/completed"));
    }

    #[tokio::test]
    async fn test_op_log_records_call_order() {
        let store = MemoryStore::new();
        store.put("workloads", "k1", Bytes::new(), None).await.unwrap();
        store.put("workloads", "k2", Bytes::new(), None).await.unwrap();
        store.delete("workloads", "k1").await.unwrap();

        assert_eq!(
            store.ops(),
            vec![
                StoreOp::Put("k1".into()),
                StoreOp::Put("k2".into()),
                StoreOp::Delete("k1".into()),
            ]
        );
        assert_eq!(store.deleted_keys(), vec!["k1".to_string()]);
    }
}

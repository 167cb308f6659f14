// Copyright © Chainweb Indexer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Object store client (§6): `list(prefix, maxKeys, startAfter) -> [key]`
//! lexicographically sorted, and `get(key) -> bytes` returning the envelope
//! JSON. Built on the `object_store` crate so the same code works against
//! local disk in tests and S3-compatible backends in production.

use std::sync::Arc;

use futures::TryStreamExt;
use object_store::path::Path;
use object_store::ObjectStore;

use crate::decode::envelope::BlockEnvelope;
use crate::error::{IndexerError, Result};

#[derive(Clone)]
pub struct ArchiveStore {
    store: Arc<dyn ObjectStore>,
}

impl ArchiveStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        ArchiveStore { store }
    }

    /// Keys under `prefix`, strictly after `start_after` in lexicographic
    /// order, capped at `max_keys` (§4.2 default 20).
    pub async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
        start_after: Option<&str>,
    ) -> Result<Vec<String>> {
        let prefix_path = Path::from(prefix);
        let mut keys: Vec<String> = self
            .store
            .list(Some(&prefix_path))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;

        keys.sort();

        let start = start_after.unwrap_or("");
        keys.retain(|k| k.as_str() > start);
        keys.truncate(max_keys);

        Ok(keys)
    }

    pub async fn get_envelope(&self, key: &str) -> Result<BlockEnvelope> {
        let path = Path::from(key);
        let bytes = self.store.get(&path).await?.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| IndexerError::Schema(format!("malformed envelope at {key}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;

    async fn seeded_store(keys: &[&str]) -> ArchiveStore {
        let mem = InMemory::new();
        for k in keys {
            mem.put(&Path::from(*k), bytes::Bytes::from_static(b"{}").into())
                .await
                .unwrap();
        }
        ArchiveStore::new(Arc::new(mem))
    }

    #[tokio::test]
    async fn lists_in_lexicographic_order_after_cursor() {
        let store = seeded_store(&["headers/k1", "headers/k3", "headers/k2"]).await;
        let keys = store.list("headers/", 20, None).await.unwrap();
        assert_eq!(keys, vec!["headers/k1", "headers/k2", "headers/k3"]);

        let keys = store
            .list("headers/", 20, Some("headers/k1"))
            .await
            .unwrap();
        assert_eq!(keys, vec!["headers/k2", "headers/k3"]);
    }

    #[tokio::test]
    async fn respects_max_keys_page_size() {
        let store = seeded_store(&["headers/k1", "headers/k2", "headers/k3"]).await;
        let keys = store.list("headers/", 2, None).await.unwrap();
        assert_eq!(keys, vec!["headers/k1", "headers/k2"]);
    }

    #[tokio::test]
    async fn empty_listing_returns_empty_page() {
        let store = seeded_store(&[]).await;
        let keys = store.list("headers/", 20, None).await.unwrap();
        assert!(keys.is_empty());
    }
}

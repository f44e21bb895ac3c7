//! Process-wide read-through metadata cache.
//!
//! Keyed by `DocType` name, safe for concurrent readers, with explicit
//! invalidation hooks the schema writer must call. Query compilation
//! never caches anything itself; this is the only shared state.

use std::sync::Arc;

use dashmap::DashMap;

use crate::provider::{MetaError, MetaProvider};
use crate::schema::DocType;

/// Read-through cache in front of a [`MetaProvider`].
///
/// `DashMap` shards keep hot-path reads cheap. Concurrent misses on the
/// same name may each hit the provider once; the fills are identical
/// within a cache generation, so last-write-wins is harmless.
pub struct MetaCache {
    source: Arc<dyn MetaProvider>,
    doctypes: DashMap<String, Arc<DocType>>,
    columns: DashMap<String, Arc<Vec<String>>>,
}

impl MetaCache {
    #[must_use]
    pub fn new(source: Arc<dyn MetaProvider>) -> Self {
        Self {
            source,
            doctypes: DashMap::new(),
            columns: DashMap::new(),
        }
    }

    /// Drop one type's cached schema and columns. Call after any schema
    /// write touching that type.
    pub fn invalidate(&self, name: &str) {
        self.doctypes.remove(name);
        self.columns.remove(name);
    }

    /// Drop everything. Call after bulk schema migration.
    pub fn invalidate_all(&self) {
        self.doctypes.clear();
        self.columns.clear();
    }
}

#[async_trait::async_trait]
impl MetaProvider for MetaCache {
    async fn doctype(&self, name: &str) -> Result<Arc<DocType>, MetaError> {
        if let Some(hit) = self.doctypes.get(name) {
            return Ok(Arc::clone(&hit));
        }
        let fetched = self.source.doctype(name).await?;
        self.doctypes
            .insert(name.to_owned(), Arc::clone(&fetched));
        Ok(fetched)
    }

    async fn table_columns(&self, doctype: &str) -> Result<Vec<String>, MetaError> {
        if let Some(hit) = self.columns.get(doctype) {
            return Ok(hit.as_ref().clone());
        }
        let fetched = self.source.table_columns(doctype).await?;
        self.columns
            .insert(doctype.to_owned(), Arc::new(fetched.clone()));
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::testing::StaticMetaProvider;

    struct CountingProvider {
        inner: StaticMetaProvider,
        hits: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MetaProvider for CountingProvider {
        async fn doctype(&self, name: &str) -> Result<Arc<DocType>, MetaError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.inner.doctype(name).await
        }

        async fn table_columns(&self, doctype: &str) -> Result<Vec<String>, MetaError> {
            self.inner.table_columns(doctype).await
        }
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let provider = Arc::new(CountingProvider {
            inner: StaticMetaProvider::new().with_doctype(DocType::new("Item"), vec!["name"]),
            hits: AtomicUsize::new(0),
        });
        let cache = MetaCache::new(provider.clone());

        cache.doctype("Item").await.unwrap();
        cache.doctype("Item").await.unwrap();
        assert_eq!(provider.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refill() {
        let provider = Arc::new(CountingProvider {
            inner: StaticMetaProvider::new().with_doctype(DocType::new("Item"), vec!["name"]),
            hits: AtomicUsize::new(0),
        });
        let cache = MetaCache::new(provider.clone());

        cache.doctype("Item").await.unwrap();
        cache.invalidate("Item");
        cache.doctype("Item").await.unwrap();
        assert_eq!(provider.hits.load(Ordering::SeqCst), 2);
    }
}

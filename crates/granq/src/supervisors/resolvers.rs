//! 🧠 Resolvers: ask the metadata service once, remember forever (well, for one run).
//!
//! Each resolver owns a plain `HashMap` cache. Groups are processed one at a time, so the
//! supervisor holds the only `&mut` and nothing here needs a lock. Values are `Arc`ed so
//! every batch of a group can borrow the same record without cloning it.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, trace};

use crate::backends::GranuleApi;
use crate::common::{Collection, Provider, construct_collection_id};
use crate::errors::QueueError;

/// 📚 Memoized collection lookups, keyed by `name___version`.
#[derive(Debug)]
pub(crate) struct CollectionResolver<'a, A> {
    api: &'a A,
    cache: HashMap<String, Arc<Collection>>,
}

impl<'a, A: GranuleApi> CollectionResolver<'a, A> {
    pub(crate) fn new(api: &'a A) -> Self {
        Self {
            api,
            cache: HashMap::new(),
        }
    }

    pub(crate) async fn resolve(&mut self, name: &str, version: &str) -> Result<Arc<Collection>> {
        let collection_id = construct_collection_id(name, version);
        if let Some(hit) = self.cache.get(&collection_id) {
            trace!("🧠 collection cache hit: {collection_id}");
            return Ok(Arc::clone(hit));
        }

        debug!("📚 looking up collection {collection_id}");
        let collection = self.api.get_collection(name, version).await.with_context(|| QueueError::Resolution {
            kind: "collection",
            key: collection_id.clone(),
        })?;
        let collection = Arc::new(collection);
        self.cache.insert(collection_id, Arc::clone(&collection));
        Ok(collection)
    }
}

/// 🏭 Memoized provider lookups, with the run's default provider short-circuiting.
#[derive(Debug)]
pub(crate) struct ProviderResolver<'a, A> {
    api: &'a A,
    default: Arc<Provider>,
    cache: HashMap<String, Arc<Provider>>,
}

impl<'a, A: GranuleApi> ProviderResolver<'a, A> {
    pub(crate) fn new(api: &'a A, default: &Provider) -> Self {
        Self {
            api,
            default: Arc::new(default.clone()),
            cache: HashMap::new(),
        }
    }

    /// 🏭 No id, an empty id, or the default's own id → the default, no call made.
    pub(crate) async fn resolve(&mut self, provider_id: Option<&str>) -> Result<Arc<Provider>> {
        let provider_id = match provider_id {
            Some(id) if !id.is_empty() && id != self.default.id => id,
            _ => return Ok(Arc::clone(&self.default)),
        };
        if let Some(hit) = self.cache.get(provider_id) {
            trace!("🧠 provider cache hit: {provider_id}");
            return Ok(Arc::clone(hit));
        }

        debug!("🏭 looking up provider {provider_id}");
        let provider = self.api.get_provider(provider_id).await.with_context(|| QueueError::Resolution {
            kind: "provider",
            key: provider_id.to_string(),
        })?;
        let provider = Arc::new(provider);
        self.cache.insert(provider_id.to_string(), Arc::clone(&provider));
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryApi;
    use crate::errors::{ErrorKind, queue_error};
    use serde_json::Map;

    fn collection(name: &str, version: &str) -> Collection {
        Collection {
            name: name.to_string(),
            version: version.to_string(),
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn the_one_where_each_collection_is_looked_up_exactly_once() -> Result<()> {
        let api = InMemoryApi::new()
            .with_collection(collection("A", "1"))
            .with_collection(collection("B", "2"));
        let mut resolver = CollectionResolver::new(&api);

        for _ in 0..5 {
            assert_eq!(resolver.resolve("A", "1").await?.name, "A");
        }
        assert_eq!(resolver.resolve("B", "2").await?.version, "2");

        assert_eq!(api.journal().await.collection_lookups, vec!["A___1", "B___2"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_default_provider_never_bothers_the_api() -> Result<()> {
        let api = InMemoryApi::new().with_provider(Provider::new("other"));
        let mut resolver = ProviderResolver::new(&api, &Provider::new("daac"));

        assert_eq!(resolver.resolve(None).await?.id, "daac");
        assert_eq!(resolver.resolve(Some("")).await?.id, "daac");
        assert_eq!(resolver.resolve(Some("daac")).await?.id, "daac");
        assert!(api.journal().await.provider_lookups.is_empty());

        assert_eq!(resolver.resolve(Some("other")).await?.id, "other");
        assert_eq!(resolver.resolve(Some("other")).await?.id, "other");
        assert_eq!(api.journal().await.provider_lookups, vec!["other"]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_lookup_is_a_resolution_error_and_not_cached() -> Result<()> {
        let api = InMemoryApi::new();
        let mut resolver = CollectionResolver::new(&api);

        for _ in 0..2 {
            let err = resolver.resolve("GHOST", "1").await.expect_err("💀 ghosts have no metadata");
            let typed = queue_error(&err).expect("💀 lost the typed layer");
            assert_eq!(typed.kind(), ErrorKind::Resolution);
            assert!(err.to_string().contains("GHOST___1"));
        }
        assert_eq!(api.journal().await.collection_lookups.len(), 2, "failures are not memoized");
        Ok(())
    }
}

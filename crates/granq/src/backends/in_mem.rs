//! # Previously, on granq...
//!
//! 🎬 The metadata service was down. The queue was unreachable. The state machine had
//! been deleted by someone "cleaning up old stacks". Someone still had to prove the
//! pipeline worked. Someone had to live entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`GranuleApi`], [`ResourceStore`] and [`Dispatcher`]
//! for tests and dry runs. They are seeded up front, remember every call in a shared
//! journal behind `Arc<Mutex<...>>`, and can be told to fail on specific granules so the
//! fail-fast paths get exercised too. Great for assertions, great for trust issues.
//!
//! Clone one before handing it to the pipeline and the clone sees everything the
//! original records. Communist data, but in a good way.
//!
//! ⚠️ This is NOT for production. No network calls. No disk I/O. Just vibes and heap.
//!
//! 🦆

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::{Dispatcher, GranuleApi, ResourceStore};
use crate::common::{Collection, DispatchHandle, GranuleStatusUpdate, Provider, construct_collection_id};
use crate::dispatch::DispatchMessage;

/// 🌱 Seed data for [`InMemoryApi`], straight from the config file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryApiConfig {
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub providers: Vec<Provider>,
}

/// 📒 Everything an [`InMemoryApi`] was asked to do, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ApiJournal {
    /// 📚 collection ids looked up (`name___version`)
    pub collection_lookups: Vec<String>,
    pub provider_lookups: Vec<String>,
    /// ✍️ successful status writes only; injected failures never land here
    pub updates: Vec<GranuleStatusUpdate>,
}

/// 🗄️ A metadata service that lives in a `HashMap` and keeps a diary.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApi {
    collections: HashMap<String, Collection>,
    providers: HashMap<String, Provider>,
    failing_granules: HashSet<String>,
    latency: Option<Duration>,
    journal: Arc<Mutex<ApiJournal>>,
    gauge: InFlightGauge,
}

impl InMemoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &InMemoryApiConfig) -> Self {
        let api = config.collections.iter().cloned().fold(Self::new(), Self::with_collection);
        config.providers.iter().cloned().fold(api, Self::with_provider)
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        let collection_id = construct_collection_id(&collection.name, &collection.version);
        self.collections.insert(collection_id, collection);
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.providers.insert(provider.id.clone(), provider);
        self
    }

    /// 💣 Status updates for this granule id will fail.
    pub fn fail_updates_for(mut self, granule_id: impl Into<String>) -> Self {
        self.failing_granules.insert(granule_id.into());
        self
    }

    /// 🐢 Every status update takes this long. Makes concurrency observable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 📒 A snapshot of the journal as of right now.
    pub async fn journal(&self) -> ApiJournal {
        self.journal.lock().await.clone()
    }

    /// 📈 Most status updates ever observed in flight at once.
    pub fn peak_updates_in_flight(&self) -> usize {
        self.gauge.peak()
    }
}

#[async_trait]
impl GranuleApi for InMemoryApi {
    async fn get_collection(&self, name: &str, version: &str) -> Result<Collection> {
        let collection_id = construct_collection_id(name, version);
        self.journal.lock().await.collection_lookups.push(collection_id.clone());
        match self.collections.get(&collection_id) {
            Some(collection) => Ok(collection.clone()),
            None => bail!("💀 Collection '{collection_id}' is not in the in-memory catalogue. Seed it first."),
        }
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Provider> {
        self.journal.lock().await.provider_lookups.push(provider_id.to_string());
        match self.providers.get(provider_id) {
            Some(provider) => Ok(provider.clone()),
            None => bail!("💀 Provider '{provider_id}' is not in the in-memory catalogue. Seed it first."),
        }
    }

    async fn update_granule(&self, update: &GranuleStatusUpdate) -> Result<()> {
        let _in_flight = self.gauge.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_granules.contains(&update.granule_id) {
            bail!("💀 Injected failure: refusing to update granule '{}'", update.granule_id);
        }
        trace!("✍️ in-memory status write for {}", update.granule_id);
        self.journal.lock().await.updates.push(update.clone());
        Ok(())
    }
}

/// 🌱 Seed data for [`InMemoryResources`]: key → JSON document.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryResourcesConfig {
    #[serde(default)]
    pub entries: HashMap<String, Value>,
}

/// 📜 A resource store that is just a `HashMap` with a fetch counter.
#[derive(Debug, Clone, Default)]
pub struct InMemoryResources {
    entries: HashMap<String, Value>,
    fetches: Arc<AtomicUsize>,
}

impl InMemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &InMemoryResourcesConfig) -> Self {
        Self {
            entries: config.entries.clone(),
            ..Self::default()
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceStore for InMemoryResources {
    async fn fetch_json(&self, key: &str) -> Result<Value> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match self.entries.get(key) {
            Some(value) => Ok(value.clone()),
            None => bail!("💀 No resource stored under '{key}'."),
        }
    }
}

/// 🚀 A dispatcher that starts nothing and remembers everything.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDispatcher {
    failing_granules: HashSet<String>,
    latency: Option<Duration>,
    messages: Arc<Mutex<Vec<DispatchMessage>>>,
    gauge: InFlightGauge,
}

impl InMemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 💣 Any message whose payload carries this granule id fails to dispatch.
    pub fn fail_when_carrying(mut self, granule_id: impl Into<String>) -> Self {
        self.failing_granules.insert(granule_id.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 📬 Every successfully dispatched message, in completion order.
    pub async fn messages(&self) -> Vec<DispatchMessage> {
        self.messages.lock().await.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.gauge.peak()
    }
}

#[async_trait]
impl Dispatcher for InMemoryDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<DispatchHandle> {
        let _in_flight = self.gauge.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(doomed) = message
            .granule_ids()
            .into_iter()
            .find(|granule_id| self.failing_granules.contains(*granule_id))
        {
            bail!("💀 Injected failure: the batch carrying '{doomed}' never leaves the station");
        }
        self.messages.lock().await.push(message.clone());
        Ok(message.handle())
    }
}

/// 📈 Counts concurrent calls and remembers the high-water mark.
#[derive(Debug, Clone, Default)]
struct InFlightGauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl InFlightGauge {
    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(&self.current)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements on drop, so cancelled calls are counted out too.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

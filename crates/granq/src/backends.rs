//! 🔌 Backends: where the real I/O happens.
//!
//! Three seams, three traits:
//! - 🗄️ [`GranuleApi`]: collection and provider lookups, plus granule status writes
//! - 📜 [`ResourceStore`]: JSON blobs by key (the message template, workflow definitions)
//! - 🚀 [`Dispatcher`]: hands a finished batch to the execution service
//!
//! Each trait gets a backend enum that picks the concrete implementation from config and
//! dispatches by `match`, so the supervisor never learns whether it is talking to RAM, a
//! directory, or a real HTTP service. It is happier that way.
//!
//! All three are `&self` + `Send + Sync`: the orchestrator calls them from several
//! in-flight batches at once, and anything stateful hides behind its own lock.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::app_config::{ApiConfig, DispatchConfig, ResourceConfig};
use crate::common::{Collection, DispatchHandle, GranuleStatusUpdate, Provider};
use crate::dispatch::DispatchMessage;

pub mod file;
pub mod http;
pub mod in_mem;

pub use file::{FileDispatcher, FileDispatcherConfig, FileResources, FileResourcesConfig};
pub use http::{HttpApi, HttpApiConfig};
pub use in_mem::{
    ApiJournal, InMemoryApi, InMemoryApiConfig, InMemoryDispatcher, InMemoryResources,
    InMemoryResourcesConfig,
};

// ===== Granule API =====

/// 🗄️ The metadata service: who is this collection, who is this provider, and please
/// write down that this granule is queued.
///
/// # Contract
/// - lookups fail (rather than return a placeholder) when the record doesn't exist
/// - `update_granule` is a create-or-replace of the granule's status record
#[async_trait]
pub trait GranuleApi: std::fmt::Debug + Send + Sync {
    /// 📚 Fetch a collection by name and version.
    async fn get_collection(&self, name: &str, version: &str) -> Result<Collection>;
    /// 🏭 Fetch a provider by id.
    async fn get_provider(&self, provider_id: &str) -> Result<Provider>;
    /// ✍️ Persist one granule status update.
    async fn update_granule(&self, update: &GranuleStatusUpdate) -> Result<()>;
}

/// 🎭 Pick-a-metadata-service. `InMemory` for tests and dry runs, `Http` for the real thing.
#[derive(Debug)]
pub enum ApiBackend {
    InMemory(InMemoryApi),
    Http(HttpApi),
}

impl ApiBackend {
    pub fn from_config(config: &ApiConfig) -> Result<Self> {
        Ok(match config {
            ApiConfig::InMemory(c) => ApiBackend::InMemory(InMemoryApi::from_config(c)),
            ApiConfig::Http(c) => ApiBackend::Http(HttpApi::new(c.clone())?),
        })
    }
}

#[async_trait]
impl GranuleApi for ApiBackend {
    async fn get_collection(&self, name: &str, version: &str) -> Result<Collection> {
        match self {
            ApiBackend::InMemory(api) => api.get_collection(name, version).await,
            ApiBackend::Http(api) => api.get_collection(name, version).await,
        }
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Provider> {
        match self {
            ApiBackend::InMemory(api) => api.get_provider(provider_id).await,
            ApiBackend::Http(api) => api.get_provider(provider_id).await,
        }
    }

    async fn update_granule(&self, update: &GranuleStatusUpdate) -> Result<()> {
        match self {
            ApiBackend::InMemory(api) => api.update_granule(update).await,
            ApiBackend::Http(api) => api.update_granule(update).await,
        }
    }
}

// ===== Resource Store =====

/// 📜 Read-only key → JSON document store.
#[async_trait]
pub trait ResourceStore: std::fmt::Debug + Send + Sync {
    async fn fetch_json(&self, key: &str) -> Result<Value>;
}

#[derive(Debug)]
pub enum ResourceBackend {
    InMemory(InMemoryResources),
    File(FileResources),
}

impl ResourceBackend {
    pub fn from_config(config: &ResourceConfig) -> Result<Self> {
        Ok(match config {
            ResourceConfig::InMemory(c) => ResourceBackend::InMemory(InMemoryResources::from_config(c)),
            ResourceConfig::File(c) => ResourceBackend::File(FileResources::new(c.clone())?),
        })
    }
}

#[async_trait]
impl ResourceStore for ResourceBackend {
    async fn fetch_json(&self, key: &str) -> Result<Value> {
        match self {
            ResourceBackend::InMemory(store) => store.fetch_json(key).await,
            ResourceBackend::File(store) => store.fetch_json(key).await,
        }
    }
}

// ===== Dispatcher =====

/// 🚀 Starts one workflow execution per message and hands back its handle.
///
/// # Contract
/// - one call, one execution. No batching, no retries.
/// - the returned handle is the message's execution ARN
#[async_trait]
pub trait Dispatcher: std::fmt::Debug + Send + Sync {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<DispatchHandle>;
}

#[derive(Debug)]
pub enum DispatchBackend {
    InMemory(InMemoryDispatcher),
    File(FileDispatcher),
}

impl DispatchBackend {
    pub async fn from_config(config: &DispatchConfig) -> Result<Self> {
        Ok(match config {
            DispatchConfig::InMemory => DispatchBackend::InMemory(InMemoryDispatcher::new()),
            DispatchConfig::File(c) => DispatchBackend::File(FileDispatcher::new(c.clone()).await?),
        })
    }
}

#[async_trait]
impl Dispatcher for DispatchBackend {
    async fn dispatch(&self, message: &DispatchMessage) -> Result<DispatchHandle> {
        match self {
            DispatchBackend::InMemory(dispatcher) => dispatcher.dispatch(message).await,
            DispatchBackend::File(dispatcher) => dispatcher.dispatch(message).await,
        }
    }
}

//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🏗️ Powered by Figment. Layout of a full config file:
//!
//! ```toml
//! [queue]
//! stack_name = "prod-stack"
//! granule_ingest_workflow = "IngestGranule"
//! queue_url = "https://sqs.us-east-1.amazonaws.com/123/startSF"
//! preferred_queue_batch_size = 10
//! concurrency = 3
//! execution_name_prefix = "ingest-"
//!
//! [queue.provider]
//! id = "daac"
//!
//! [queue.parent]
//! state_machine = "arn:aws:states:us-east-1:123:stateMachine:DiscoverGranules"
//! execution_name = "discover-1"
//!
//! [api.Http]
//! url = "https://granules.example.com/v1"
//!
//! [resources.File]
//! root = "./resources"
//!
//! [dispatch.File]
//! file_name = "dispatched.ndjson"
//!
//! [runtime]
//! progress = true
//! ```

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::backends::{
    FileDispatcherConfig, FileResourcesConfig, HttpApiConfig, InMemoryApiConfig, InMemoryResourcesConfig,
};
use crate::common::Provider;
use crate::dispatch::build_execution_arn;

/// 📦 The AppConfig: one struct to rule them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub queue: QueueConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🧺 The knobs of one queue run.
#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    /// 🗝️ Prefix for resource keys: `{stack_name}/workflow_template.json` and friends.
    pub stack_name: String,
    /// 🛠️ Workflow every batch is dispatched to.
    pub granule_ingest_workflow: String,
    pub queue_url: String,
    /// 🏭 The run's default provider. Groups without a provider (or with this one's id)
    /// use it as-is, without a lookup.
    pub provider: Provider,
    /// 📦 Granules per dispatched batch. Absent, zero or negative means 1.
    #[serde(default)]
    pub preferred_queue_batch_size: Option<i64>,
    /// 🚦 Bound on in-flight batches per group, and on in-flight status writes per batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub execution_name_prefix: Option<String>,
    /// 🧬 Extra `meta` entries for every dispatched message.
    #[serde(default)]
    pub child_workflow_meta: Map<String, Value>,
    #[serde(default)]
    pub parent: Option<ParentExecution>,
}

fn default_concurrency() -> usize {
    3
}

/// 👪 The execution that kicked off this run, if it was kicked off by one.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ParentExecution {
    pub state_machine: String,
    pub execution_name: String,
}

impl QueueConfig {
    /// 📦 Effective batch size: never below 1.
    pub fn chunk_size(&self) -> usize {
        match self.preferred_queue_batch_size {
            Some(size) if size > 0 => usize::try_from(size).unwrap_or(usize::MAX),
            _ => 1,
        }
    }

    /// 🚦 Effective concurrency: never below 1. Zero lanes is not a highway.
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// 👪 The parent execution's ARN, when there is a parent with enough to build one.
    pub fn parent_execution_arn(&self) -> Option<String> {
        self.parent
            .as_ref()
            .and_then(|parent| build_execution_arn(&parent.state_machine, &parent.execution_name))
    }
}

/// 🗄️ Which granule API to talk to. Defaults to an empty in-memory one.
#[derive(Debug, Deserialize, Clone)]
pub enum ApiConfig {
    InMemory(InMemoryApiConfig),
    Http(HttpApiConfig),
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig::InMemory(InMemoryApiConfig::default())
    }
}

/// 📜 Where the template and workflow definitions are read from.
#[derive(Debug, Deserialize, Clone)]
pub enum ResourceConfig {
    InMemory(InMemoryResourcesConfig),
    File(FileResourcesConfig),
}

impl Default for ResourceConfig {
    fn default() -> Self {
        ResourceConfig::InMemory(InMemoryResourcesConfig::default())
    }
}

/// 🚀 Where dispatched batches go.
#[derive(Debug, Deserialize, Clone, Default)]
pub enum DispatchConfig {
    #[default]
    InMemory,
    File(FileDispatcherConfig),
}

/// 🎛️ Process-level niceties that have nothing to do with what gets queued.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 📊 Draw the progress bar on stderr.
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_progress() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            progress: default_progress(),
        }
    }
}

/// 🚀 Load the config: environment variables (`GRANQ_*`), plus a TOML file if given.
///
/// Nested keys use a double underscore: `GRANQ_QUEUE__CONCURRENCY=8` is `queue.concurrency`.
/// When both define a key, the TOML file wins.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("GRANQ_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (GRANQ_*). \
             The file exists in our hearts, but apparently not on disk. Or the [queue] section is incomplete.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (GRANQ_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! Two file-backed backends for running the whole pipeline on one laptop:
//!
//! - [`FileResources`] resolves resource keys against a root directory, so
//!   `stack/workflow_template.json` is just `<root>/stack/workflow_template.json`.
//! - [`FileDispatcher`] writes each dispatched message as one NDJSON line
//!   (`{"queueUrl", "executionArn", "message"}`) to a file, through a `BufWriter`, so
//!   we're not doing three syscalls per batch like some kind of 1995 CGI script.
//!
//! 🚰 DispatchMessage → serde_json → BufWriter → disk
//! 💀 Disk full → your problem now
//! 🦆

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::{Dispatcher, ResourceStore};
use crate::common::DispatchHandle;
use crate::dispatch::DispatchMessage;

/// 📂 Where resource keys are resolved from.
#[derive(Debug, Deserialize, Clone)]
pub struct FileResourcesConfig {
    pub root: PathBuf,
}

/// 📜 A [`ResourceStore`] backed by a directory of JSON files.
#[derive(Debug)]
pub struct FileResources {
    config: FileResourcesConfig,
}

impl FileResources {
    pub fn new(config: FileResourcesConfig) -> Result<Self> {
        if !config.root.is_dir() {
            bail!(
                "💀 Resource root '{}' is not a directory. We looked. Twice.",
                config.root.display()
            );
        }
        Ok(Self { config })
    }

    /// 🧭 Resolve a key under the root. Keys never climb out of it.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let well_behaved = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !well_behaved {
            bail!("💀 Resource key '{key}' tries to leave the resource root. Nice try.");
        }
        Ok(self.config.root.join(relative))
    }
}

#[async_trait]
impl ResourceStore for FileResources {
    async fn fetch_json(&self, key: &str) -> Result<Value> {
        let path = self.resolve(key)?;
        trace!("📂 reading resource {}", path.display());
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("💀 Resource '{key}' could not be read from '{}'", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("💀 Resource '{key}' is not valid JSON"))
    }
}

/// 🚰 Where dispatched messages get written down.
#[derive(Debug, Deserialize, Clone)]
pub struct FileDispatcherConfig {
    pub file_name: String,
}

/// 📝 One NDJSON line per dispatched batch.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DispatchRecord<'a> {
    queue_url: &'a str,
    execution_arn: &'a str,
    message: &'a Value,
}

/// 🚀 A [`Dispatcher`] that "starts" executions by writing them to a file.
///
/// ⚠️ `File::create` truncates if the file exists. No warning. No backup. Just gone.
#[derive(Debug)]
pub struct FileDispatcher {
    file_buf: Mutex<BufWriter<File>>,
    config: FileDispatcherConfig,
}

impl FileDispatcher {
    pub async fn new(config: FileDispatcherConfig) -> Result<Self> {
        let file_handle = File::create(&config.file_name).await.with_context(|| {
            format!(
                "💀 The dispatch file '{}' could not be conjured into existence. \
                 One of us was wrong about whether the parent directory existed. It was us.",
                config.file_name
            )
        })?;
        Ok(Self {
            file_buf: Mutex::new(BufWriter::new(file_handle)),
            config,
        })
    }
}

#[async_trait]
impl Dispatcher for FileDispatcher {
    /// 📥 Serialize, append, flush. The line is on disk before the handle comes back,
    /// so a run that dies halfway leaves only whole records behind.
    async fn dispatch(&self, message: &DispatchMessage) -> Result<DispatchHandle> {
        let mut line = serde_json::to_vec(&DispatchRecord {
            queue_url: &message.queue_url,
            execution_arn: &message.execution_arn,
            message: &message.body,
        })
        .context("💀 The dispatch record refused to serialize")?;
        line.push(b'\n');

        let mut file_buf = self.file_buf.lock().await;
        file_buf.write_all(&line).await.with_context(|| {
            format!("💀 Could not append to dispatch file '{}'", self.config.file_name)
        })?;
        file_buf.flush().await.context(
            "💀 Error flushing the dispatch file. The bytes were SO CLOSE. They could see the disk.",
        )?;
        trace!("📬 wrote execution {} to {}", message.execution_arn, self.config.file_name);
        Ok(message.handle())
    }
}

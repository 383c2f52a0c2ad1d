//! 🌾 granq: group granules by collection and provider, chunk them into batches, mark them
//! queued, and start one ingest execution per batch.
//!
//! Two ways in:
//! - [`queue_granules`]: bring your own backends (anything implementing the traits in
//!   [`backends`])
//! - [`run`]: build the backends from an [`AppConfig`] and get a [`RunReport`] back

pub mod app_config;
pub mod backends;
pub mod common;
pub mod dispatch;
pub mod errors;
pub mod grouping;
pub mod input;
pub mod progress;
pub mod supervisors;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::app_config::{AppConfig, QueueConfig};
use crate::backends::{ApiBackend, DispatchBackend, Dispatcher, GranuleApi, ResourceBackend, ResourceStore};
use crate::common::{QueueInput, QueueOutput};
use crate::progress::{GroupTally, QueueProgress};
use crate::supervisors::Supervisor;

/// 🧾 What [`run`] hands back: the output, plus how it was spread across groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub output: QueueOutput,
    pub groups: Vec<GroupTally>,
}

/// 🚀 Queue `input` through caller-supplied backends.
pub async fn queue_granules<A, R, D>(
    input: QueueInput,
    config: &QueueConfig,
    api: &A,
    resources: &R,
    dispatcher: &D,
) -> Result<QueueOutput>
where
    A: GranuleApi,
    R: ResourceStore,
    D: Dispatcher,
{
    Supervisor::new(config, api, resources, dispatcher).run(input).await
}

/// 🚀 Build backends from config, queue `input`, report.
pub async fn run(app_config: AppConfig, input: QueueInput) -> Result<RunReport> {
    let api = ApiBackend::from_config(&app_config.api).context("💀 Failed to set up the granule API backend")?;
    let resources =
        ResourceBackend::from_config(&app_config.resources).context("💀 Failed to set up the resource backend")?;
    let dispatcher = DispatchBackend::from_config(&app_config.dispatch)
        .await
        .context("💀 Failed to set up the dispatch backend")?;

    let progress = if app_config.runtime.progress {
        QueueProgress::new(input.granules.len() as u64)
    } else {
        QueueProgress::hidden()
    };

    let output = Supervisor::new(&app_config.queue, &api, &resources, &dispatcher)
        .with_progress(progress.clone())
        .run(input)
        .await?;
    let groups = progress.tallies().await;
    info!("🏁 {} group(s), {} execution(s)", groups.len(), output.running.len());

    Ok(RunReport { output, groups })
}

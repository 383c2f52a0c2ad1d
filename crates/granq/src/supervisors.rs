//! 🎬 *[camera pans across a queue of forty thousand granules]*
//! 🎬 "In a world where granules must be queued..."
//! 🎬 "One supervisor dared to group them first." 🦆
//!
//! 📦 The Supervisor runs one queue pass:
//!
//! ```text
//!   fetch template + workflow (once, concurrently)
//!   for each group, strictly one at a time:
//!       resolve collection + provider (memoized, concurrently)
//!       batches ──buffered(C)──▶ BatchWorker: validate ▸ stage (≤ C) ▸ dispatch
//!   flatten handles, group order then batch order
//! ```
//!
//! The first error anywhere ends the run. In-flight siblings are dropped, and no partial
//! handle list is returned.
//!
//! ⚠️ The workers are the supervisor's private little minions. They stay `pub(crate)`.

mod batch_worker;
mod resolvers;
pub mod stager;

use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use serde_json::Value;
use tracing::{debug, info};

use crate::app_config::QueueConfig;
use crate::backends::{Dispatcher, GranuleApi, ResourceStore};
use crate::common::{DispatchHandle, Granule, QueueInput, QueueOutput, WorkflowDefinition, deconstruct_collection_id};
use crate::dispatch::{DispatchContext, template_key, workflow_file_key};
use crate::errors::QueueError;
use crate::grouping::{COLLECTION_ID_FIELD, Group, GroupAndChunk, GroupDescriptor, PROVIDER_FIELD, granule_group};
use crate::progress::{GroupTally, QueueProgress};
use batch_worker::{BatchWorker, DispatchedBatch, GroupTarget};
use resolvers::{CollectionResolver, ProviderResolver};

/// 📦 One queue run's worth of config and collaborators. Borrowed, never owned.
#[derive(Debug)]
pub struct Supervisor<'a, A, R, D> {
    config: &'a QueueConfig,
    api: &'a A,
    resources: &'a R,
    dispatcher: &'a D,
    progress: QueueProgress,
}

impl<'a, A, R, D> Supervisor<'a, A, R, D>
where
    A: GranuleApi,
    R: ResourceStore,
    D: Dispatcher,
{
    pub fn new(config: &'a QueueConfig, api: &'a A, resources: &'a R, dispatcher: &'a D) -> Self {
        Self {
            config,
            api,
            resources,
            dispatcher,
            progress: QueueProgress::hidden(),
        }
    }

    /// 📊 Report into this progress tracker instead of a hidden one.
    pub fn with_progress(mut self, progress: QueueProgress) -> Self {
        self.progress = progress;
        self
    }

    /// 🚀 Group, chunk, stage and dispatch every granule in `input`.
    pub async fn run(&self, input: QueueInput) -> Result<QueueOutput> {
        let QueueInput { granules, pdr } = input;
        let chunk_size = self.config.chunk_size();
        info!(
            "🚀 queueing {} granule(s) for workflow {} (batch size {}, concurrency {})",
            granules.len(),
            self.config.granule_ingest_workflow,
            chunk_size,
            self.config.concurrency()
        );

        let context = self.dispatch_context(pdr.clone()).await?;
        let worker = BatchWorker {
            api: self.api,
            dispatcher: self.dispatcher,
            context: &context,
            progress: &self.progress,
            concurrency: self.config.concurrency(),
        };
        let mut collections = CollectionResolver::new(self.api);
        let mut providers = ProviderResolver::new(self.api, &self.config.provider);

        let mut running = Vec::new();
        for group in GroupAndChunk::new(&granules, granule_group, chunk_size) {
            let handles = self
                .queue_group(group, &mut collections, &mut providers, &worker)
                .await?;
            running.extend(handles);
        }

        self.progress.finish();
        info!("✅ started {} execution(s)", running.len());
        Ok(QueueOutput { running, pdr })
    }

    /// 🧰 Everything every batch of this run shares: template, workflow, addressing.
    async fn dispatch_context(&self, pdr: Option<Value>) -> Result<DispatchContext> {
        let stack = &self.config.stack_name;
        let workflow_name = &self.config.granule_ingest_workflow;
        let template_key = template_key(stack);
        let workflow_key = workflow_file_key(stack, workflow_name);

        let (template, workflow) = futures::try_join!(
            async {
                self.resources
                    .fetch_json(&template_key)
                    .await
                    .with_context(|| format!("💀 Could not load the message template '{template_key}'"))
            },
            async {
                self.resources
                    .fetch_json(&workflow_key)
                    .await
                    .with_context(|| format!("💀 Could not load workflow definition '{workflow_key}'"))
            },
        )?;
        let workflow: WorkflowDefinition = serde_json::from_value(workflow).with_context(|| {
            format!("💀 Workflow definition '{workflow_key}' needs a 'name' and an 'arn'")
        })?;
        debug!("🛠️ dispatching to {} ({})", workflow.name, workflow.arn);

        Ok(DispatchContext {
            template,
            workflow,
            queue_url: self.config.queue_url.clone(),
            parent_execution_arn: self.config.parent_execution_arn(),
            execution_name_prefix: self.config.execution_name_prefix.clone(),
            child_workflow_meta: self.config.child_workflow_meta.clone(),
            pdr,
        })
    }

    /// 🧺 One group: resolve its metadata, then push its batches through the worker.
    async fn queue_group<F>(
        &self,
        group: Group<'_, Granule, F>,
        collections: &mut CollectionResolver<'a, A>,
        providers: &mut ProviderResolver<'a, A>,
        worker: &BatchWorker<'_, A, D>,
    ) -> Result<Vec<DispatchHandle>>
    where
        F: Fn(&Granule) -> GroupDescriptor,
    {
        let Group {
            descriptor,
            leader,
            chunks,
            ..
        } = group;
        let collection_id = descriptor
            .get(COLLECTION_ID_FIELD)
            .ok_or_else(|| QueueError::MissingCollection {
                granule_id: leader.granule_id.clone(),
            })?;
        let (name, version) = deconstruct_collection_id(collection_id)?;

        let (collection, provider) = futures::try_join!(
            collections.resolve(name, version),
            providers.resolve(descriptor.get(PROVIDER_FIELD)),
        )?;
        info!("🧺 queueing group {} (provider {})", collection_id, provider.id);

        let target = GroupTarget {
            collection_id,
            collection: &collection,
            provider: &provider,
        };
        let batches: Vec<DispatchedBatch> = stream::iter(chunks)
            .map(|batch| worker.queue_batch(target, batch))
            .buffered(self.config.concurrency())
            .try_collect()
            .await?;

        self.progress
            .group_finished(GroupTally {
                collection_id: collection_id.to_string(),
                provider: provider.id.clone(),
                batches: batches.len(),
                granules: batches.iter().map(|batch| batch.granules).sum(),
            })
            .await;
        Ok(batches.into_iter().map(|batch| batch.handle).collect())
    }
}

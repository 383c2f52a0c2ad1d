//! 🧵 BatchWorker: takes one batch from the supervisor and sees it all the way out the door.
//!
//! Per batch, in this order:
//! 1. stamp a copy of each granule with `createdAt = now` where it has none (one `now`
//!    per batch)
//! 2. validate every granule; a bad one fails the batch before anything is written
//! 3. write every status update, at most `concurrency` in flight
//! 4. build the message and dispatch it, exactly once
//!
//! The worker is shared by every in-flight batch of a group, so it only holds borrows.

use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::debug;

use crate::backends::{Dispatcher, GranuleApi};
use crate::common::{Collection, DispatchHandle, Granule, GranuleStatusUpdate, Provider};
use crate::dispatch::DispatchContext;
use crate::errors::QueueError;
use crate::progress::QueueProgress;
use crate::supervisors::stager;

/// 🎯 The group a batch belongs to, resolved.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GroupTarget<'g> {
    pub(crate) collection_id: &'g str,
    pub(crate) collection: &'g Collection,
    pub(crate) provider: &'g Provider,
}

/// 📬 What a dispatched batch leaves behind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DispatchedBatch {
    pub(crate) handle: DispatchHandle,
    pub(crate) granules: usize,
}

#[derive(Debug)]
pub(crate) struct BatchWorker<'w, A, D> {
    pub(crate) api: &'w A,
    pub(crate) dispatcher: &'w D,
    pub(crate) context: &'w DispatchContext,
    pub(crate) progress: &'w QueueProgress,
    pub(crate) concurrency: usize,
}

impl<A: GranuleApi, D: Dispatcher> BatchWorker<'_, A, D> {
    pub(crate) async fn queue_batch(&self, target: GroupTarget<'_>, batch: Vec<&Granule>) -> Result<DispatchedBatch> {
        let now = now_millis();
        let granules: Vec<Granule> = batch
            .into_iter()
            .map(|granule| granule.with_default_created_at(now))
            .collect();

        let updates = granules
            .iter()
            .map(|granule| stager::stage_update(granule, target.collection_id))
            .collect::<Result<Vec<GranuleStatusUpdate>, QueueError>>()?;

        stream::iter(updates.iter().map(|update| stager::apply(self.api, update)))
            .buffer_unordered(self.concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;

        let message = self.context.build_message(target.collection, target.provider, &granules)?;
        let handle = self
            .dispatcher
            .dispatch(&message)
            .await
            .with_context(|| QueueError::Dispatch {
                collection_id: target.collection_id.to_string(),
                granules: granules.len(),
            })?;

        debug!(
            "🚀 dispatched {} granule(s) of {} as {}",
            granules.len(),
            target.collection_id,
            handle
        );
        self.progress.batch_dispatched(granules.len());
        Ok(DispatchedBatch {
            handle,
            granules: granules.len(),
        })
    }
}

/// ⏰ Wall clock, epoch millis. Before 1970 is not a date we support.
fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

//! ✍️ Stager: turn a granule into a `queued` status update, then write it.
//!
//! Split in two on purpose: [`stage_update`] is pure and can refuse a granule before any
//! side effect happens, [`apply`] is the one API call.

use anyhow::{Context, Result};
use serde_json::Number;
use tracing::trace;

use crate::backends::GranuleApi;
use crate::common::{Granule, GranuleStatus, GranuleStatusUpdate};
use crate::errors::QueueError;

/// 🧾 Build the status update for one granule.
///
/// - `updatedAt` must be a non-negative whole number of millis, if present
/// - `producerGranuleId` falls back to `granuleId`
/// - `archived` falls back to `false`
/// - `updatedAt` falls back to `createdAt`
pub fn stage_update(granule: &Granule, collection_id: &str) -> Result<GranuleStatusUpdate, QueueError> {
    let updated_at = match &granule.updated_at {
        Some(raw) => Some(epoch_millis(raw).ok_or_else(|| QueueError::InvalidUpdatedAt {
            granule_id: granule.granule_id.clone(),
            value: raw.to_string(),
        })?),
        None => None,
    };
    let producer_granule_id = granule
        .producer_granule_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .unwrap_or(&granule.granule_id)
        .to_string();

    Ok(GranuleStatusUpdate {
        collection_id: collection_id.to_string(),
        granule_id: granule.granule_id.clone(),
        producer_granule_id,
        status: GranuleStatus::Queued,
        updated_at: updated_at.or(granule.created_at),
        created_at: granule.created_at,
        archived: granule.archived.unwrap_or(false),
    })
}

/// ⏰ `5` and `5.0` are fine. `-5`, `1.5` and friends are not.
fn epoch_millis(raw: &Number) -> Option<u64> {
    if let Some(millis) = raw.as_u64() {
        return Some(millis);
    }
    match raw.as_f64() {
        Some(millis) if millis.is_finite() && millis >= 0.0 && millis.fract() == 0.0 && millis < u64::MAX as f64 => {
            Some(millis as u64)
        }
        _ => None,
    }
}

/// 📡 Write one status update. Failure names the granule.
pub async fn apply<A: GranuleApi>(api: &A, update: &GranuleStatusUpdate) -> Result<()> {
    trace!("✍️ staging {} as queued", update.granule_id);
    api.update_granule(update).await.with_context(|| QueueError::Staging {
        granule_id: update.granule_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryApi;
    use crate::errors::{ErrorKind, queue_error};

    fn granule_with_updated_at(raw: serde_json::Value) -> Granule {
        let mut granule = Granule::new("g-1");
        granule.created_at = Some(100);
        granule.updated_at = match raw {
            serde_json::Value::Number(n) => Some(n),
            _ => None,
        };
        granule
    }

    #[test]
    fn the_one_where_defaults_fill_in_the_blanks() -> anyhow::Result<()> {
        let mut granule = Granule::new("g-1");
        granule.created_at = Some(100);
        let update = stage_update(&granule, "A___1")?;

        assert_eq!(update.collection_id, "A___1");
        assert_eq!(update.producer_granule_id, "g-1");
        assert_eq!(update.status, GranuleStatus::Queued);
        assert_eq!(update.updated_at, Some(100), "updatedAt falls back to createdAt");
        assert_eq!(update.created_at, Some(100));
        assert!(!update.archived);
        Ok(())
    }

    #[test]
    fn the_one_where_provided_values_are_left_alone() -> anyhow::Result<()> {
        let mut granule = granule_with_updated_at(serde_json::json!(250));
        granule.producer_granule_id = Some("producer-1".to_string());
        granule.archived = Some(true);
        let update = stage_update(&granule, "A___1")?;

        assert_eq!(update.producer_granule_id, "producer-1");
        assert_eq!(update.updated_at, Some(250));
        assert!(update.archived);
        Ok(())
    }

    #[test]
    fn the_one_where_whole_floats_pass_and_weird_numbers_do_not() {
        let ok = stage_update(&granule_with_updated_at(serde_json::json!(7.0)), "A___1");
        assert_eq!(ok.map(|u| u.updated_at).ok().flatten(), Some(7));
        let zero = stage_update(&granule_with_updated_at(serde_json::json!(0)), "A___1");
        assert_eq!(zero.map(|u| u.updated_at).ok().flatten(), Some(0));

        for bad in [serde_json::json!(-5), serde_json::json!(1.5), serde_json::json!(-0.5)] {
            let err = stage_update(&granule_with_updated_at(bad.clone()), "A___1")
                .expect_err("💀 a nonsense timestamp slipped through");
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert!(err.to_string().contains("g-1"), "{err}");
            assert!(err.to_string().contains(&bad.to_string()), "{err}");
        }
    }

    #[test]
    fn the_one_where_a_timestamp_past_u64_is_refused_not_clamped() {
        for raw in [18446744073709551616.0_f64, 1e20] {
            let mut granule = Granule::new("g-1");
            granule.updated_at = serde_json::Number::from_f64(raw);
            let err = stage_update(&granule, "A___1").expect_err("💀 2^64 and up got squashed into u64::MAX");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[tokio::test]
    async fn the_one_where_a_failed_write_is_a_staging_error() -> anyhow::Result<()> {
        let api = InMemoryApi::new().fail_updates_for("g-1");
        let update = stage_update(&Granule::new("g-1"), "A___1")?;

        let err = apply(&api, &update).await.expect_err("💀 the injected failure didn't fire");
        assert_eq!(queue_error(&err).map(QueueError::kind), Some(ErrorKind::Staging));
        assert!(api.journal().await.updates.is_empty());
        Ok(())
    }
}

//! 💀 Errors: the four horsemen of a queue run.
//!
//! Everything in granq returns `anyhow::Result`, same as always. The typed [`QueueError`]
//! rides along inside the anyhow chain, either as the root cause (validation) or as a
//! context layer wrapped around whatever a collaborator threw at us (resolution, staging,
//! dispatch). Callers who care which horseman showed up do
//! `err.downcast_ref::<QueueError>()` and read [`QueueError::kind`].
//!
//! 🦆 Nothing in here retries. Retrying is the caller's hobby, not ours.

use thiserror::Error;

/// 🏷️ The coarse category of a failed run. Four doors, one exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A granule could not be routed, or carried a nonsense timestamp.
    Validation,
    /// Collection or provider metadata lookup failed.
    Resolution,
    /// The granule status update call failed.
    Staging,
    /// The dispatch (enqueue) call failed.
    Dispatch,
}

/// 💀 The typed failure taxonomy of a queue run.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error(
        "Invalid collection information provided for granule with granuleId: {granule_id}, \
         please check the input to make sure collection information is provided"
    )]
    MissingCollection { granule_id: String },

    #[error("Invalid collectionId '{collection_id}': expected '<name>___<version>'")]
    MalformedCollectionId { collection_id: String },

    #[error("Invalid updatedAt value: {value} for granule with granuleId: {granule_id}")]
    InvalidUpdatedAt { granule_id: String, value: String },

    #[error("Failed to resolve {kind} '{key}'")]
    Resolution { kind: &'static str, key: String },

    #[error("Failed to mark granule '{granule_id}' as queued")]
    Staging { granule_id: String },

    #[error("Failed to dispatch a batch of {granules} granule(s) for collection '{collection_id}'")]
    Dispatch { collection_id: String, granules: usize },
}

impl QueueError {
    /// 🗂️ Which of the four doors this error walked through.
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::MissingCollection { .. }
            | QueueError::MalformedCollectionId { .. }
            | QueueError::InvalidUpdatedAt { .. } => ErrorKind::Validation,
            QueueError::Resolution { .. } => ErrorKind::Resolution,
            QueueError::Staging { .. } => ErrorKind::Staging,
            QueueError::Dispatch { .. } => ErrorKind::Dispatch,
        }
    }
}

/// 🔎 Dig the [`QueueError`] out of an anyhow chain, wherever it is hiding.
pub fn queue_error(err: &anyhow::Error) -> Option<&QueueError> {
    err.downcast_ref::<QueueError>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn the_one_where_the_typed_error_survives_being_wrapped_in_context() {
        let root: anyhow::Result<()> = Err(anyhow::anyhow!("connection refused"));
        let wrapped = root
            .context(QueueError::Staging {
                granule_id: "g-1".to_string(),
            })
            .context("while queueing group MOD09GQ___006");

        let err = wrapped.expect_err("💀 the error vanished. it was right there.");
        let typed = queue_error(&err).expect("💀 the typed layer got lost in the chain");
        assert_eq!(typed.kind(), ErrorKind::Staging);
        assert!(format!("{err:#}").contains("connection refused"));
    }

    #[test]
    fn the_one_where_validation_errors_name_the_granule() {
        let err = QueueError::InvalidUpdatedAt {
            granule_id: "granule-7".to_string(),
            value: "-5".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("granule-7"));
        assert!(err.to_string().contains("-5"));
    }
}

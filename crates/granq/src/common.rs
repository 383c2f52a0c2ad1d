//! 📦 Common data structures: the building blocks of granq.
//!
//! 🎬 COLD OPEN: INT. INGEST PIPELINE, 3:47 AM
//!
//! Forty thousand granules arrive in one JSON array. Some know their collection. Some only
//! know their `dataType` and `version`, like a tourist who knows the street but not the
//! city. A few know nothing at all. They will be found out. Eventually.
//!
//! This module holds the humble structs that carry granules, metadata and results through
//! the pipeline. They do not ask questions. They serialize in camelCase because the rest
//! of the ingest world does, and we are polite guests.
//!
//! 🦆

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::QueueError;

/// 🔗 The glue between a collection name and its version. Three underscores, no more, no less.
pub const COLLECTION_ID_SEPARATOR: &str = "___";

/// 🏗️ `("MOD09GQ", "006")` → `"MOD09GQ___006"`.
pub fn construct_collection_id(name: &str, version: &str) -> String {
    format!("{name}{COLLECTION_ID_SEPARATOR}{version}")
}

/// 🔪 `"MOD09GQ___006"` → `("MOD09GQ", "006")`. Splits on the *last* separator so names
/// containing `___` survive. Both halves must be non-empty.
pub fn deconstruct_collection_id(collection_id: &str) -> Result<(&str, &str), QueueError> {
    match collection_id.rsplit_once(COLLECTION_ID_SEPARATOR) {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => Ok((name, version)),
        _ => Err(QueueError::MalformedCollectionId {
            collection_id: collection_id.to_string(),
        }),
    }
}

/// 🌾 A `Granule`: one unit of ingest work, about to be grouped, staged, and shipped.
///
/// Only the fields the pipeline reasons about are typed. Everything else (`files`,
/// checksums, whatever the upstream discovery step felt like attaching) is kept in
/// `extra` and travels untouched into the dispatch payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Granule {
    pub granule_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// 🧬 Collection short name, used with `version` when `collection_id` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_granule_id: Option<String>,
    /// ⏰ Epoch millis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// ⏰ Kept as a raw JSON number so the stager can reject `-5` and `1.5` with a proper
    /// validation error instead of a serde shrug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Number>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Granule {
    /// 🌱 A bare granule with nothing but an id. Mostly for tests and doc examples.
    pub fn new(granule_id: impl Into<String>) -> Self {
        Self {
            granule_id: granule_id.into(),
            collection_id: None,
            data_type: None,
            version: None,
            provider: None,
            archived: None,
            producer_granule_id: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// 🧭 The routing collection id: `collectionId` if present and non-empty, otherwise
    /// derived from `dataType` + `version`, otherwise `None` (and a very bad day later).
    pub fn resolved_collection_id(&self) -> Option<String> {
        if let Some(collection_id) = self.collection_id.as_deref().filter(|id| !id.is_empty()) {
            return Some(collection_id.to_string());
        }
        match (self.data_type.as_deref(), self.version.as_deref()) {
            (Some(name), Some(version)) if !name.is_empty() && !version.is_empty() => {
                Some(construct_collection_id(name, version))
            }
            _ => None,
        }
    }

    /// 🕰️ A copy of this granule whose `createdAt` falls back to `now` when missing.
    /// The source list is never touched; every batch works on its own copies.
    pub fn with_default_created_at(&self, now: u64) -> Granule {
        let mut stamped = self.clone();
        stamped.created_at = Some(self.created_at.unwrap_or(now));
        stamped
    }
}

/// 📚 Collection metadata, as returned by the collections API. Opaque beyond name/version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub version: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 🏭 Provider metadata. Opaque beyond the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Provider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

/// 🛠️ The workflow every batch gets dispatched to: a name and a state machine ARN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    pub arn: String,
}

/// 🚦 The only status this pipeline ever writes. It is a queue, after all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GranuleStatus {
    Queued,
}

/// ✍️ The body of one granule status update call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleStatusUpdate {
    pub collection_id: String,
    pub granule_id: String,
    pub producer_granule_id: String,
    pub status: GranuleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    pub archived: bool,
}

/// 🎟️ Proof that a batch was handed to the execution service: its execution ARN.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DispatchHandle(pub String);

impl std::fmt::Display for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 📥 What a queue run eats: granules, plus an optional PDR reference to pass through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueInput {
    #[serde(default)]
    pub granules: Vec<Granule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdr: Option<Value>,
}

/// 📤 What a queue run returns: every execution it started, and the PDR it was handed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueOutput {
    pub running: Vec<DispatchHandle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdr: Option<Value>,
}

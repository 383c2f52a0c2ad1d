//! 🧺 Grouping: sort the laundry without ever piling it on the floor.
//!
//! Given a flat slice of items and a key function, [`GroupAndChunk`] yields one [`Group`]
//! per distinct [`GroupKey`] in first-seen order. Each group carries a lazy [`Chunks`]
//! iterator that re-scans the slice from the group's first index and hands out batches of
//! at most `chunk_size` items, in original order.
//!
//! 🧠 Knowledge graph:
//! - no per-group `Vec` is ever built; a group's items only exist one batch at a time
//! - cost: one outer pass plus one filtered re-scan per group (O(groups × n) worst case)
//! - memory: the `seen` set of keys plus the current batch buffer
//!
//! ```text
//!   items:  [A1, B1, A2, A3]          chunk_size = 2
//!   groups: A → [[A1, A2], [A3]]
//!           B → [[B1]]
//! ```
//!
//! 🦆 The duck was grouped with the other ducks. It did not consent. It did not need to.

mod chunked;
mod iterable;

pub use chunked::{Chunked, chunked};
pub use iterable::{Chunks, Group, GroupAndChunk, GroupMembers};

use crate::common::Granule;

/// 🏷️ Field name of the collection id in a granule's [`GroupDescriptor`].
pub const COLLECTION_ID_FIELD: &str = "collectionId";
/// 🏷️ Field name of the provider id in a granule's [`GroupDescriptor`].
pub const PROVIDER_FIELD: &str = "provider";

// Separators are ASCII control chars so they can't show up in sane ids.
const FIELD_SEPARATOR: char = '\u{1f}';
const VALUE_SEPARATOR: char = '\u{1e}';

/// 🗂️ An ordered set of named routing fields, e.g. `{collectionId, provider}`.
///
/// A field whose value is missing or empty is "absent" and does not contribute to the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDescriptor {
    fields: Vec<(&'static str, Option<String>)>,
}

impl GroupDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// ➕ Append a field. Order matters: it is the order the key is built in.
    pub fn with(mut self, name: &'static str, value: Option<impl Into<String>>) -> Self {
        self.fields.push((name, value.map(Into::into)));
        self
    }

    /// 🔎 The value of a field, if present and non-empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .and_then(|(_, value)| value.as_deref())
            .filter(|value| !value.is_empty())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, Option<&str>)> + '_ {
        self.fields
            .iter()
            .map(|(name, value)| (*name, value.as_deref().filter(|v| !v.is_empty())))
    }

    /// 🔑 Concatenate the present values into the group's identity.
    ///
    /// Each present value is tagged with its field name so `{a: "x"}` and `{b: "x"}` stay
    /// distinct, and separated so `"ab" + "c"` never equals `"a" + "bc"`. A descriptor with
    /// nothing present yields the empty key, which is a perfectly valid group.
    pub fn key(&self) -> GroupKey {
        let mut key = String::new();
        for (name, value) in self.fields() {
            if let Some(value) = value {
                key.push_str(name);
                key.push(FIELD_SEPARATOR);
                key.push_str(value);
                key.push(VALUE_SEPARATOR);
            }
        }
        GroupKey(key)
    }
}

/// 🔑 Identity of a group. Used for dedup only, never persisted, never parsed back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 🌾 The granule key function: route by collection (explicit or derived) and provider.
///
/// Pure and infallible. A granule with no collection clues lands in a group without a
/// `collectionId`, and the supervisor refuses that group when it gets to it. Groups seen
/// before that one have already been dispatched by then; the run stops there, it does not
/// roll back.
pub fn granule_group(granule: &Granule) -> GroupDescriptor {
    GroupDescriptor::new()
        .with(COLLECTION_ID_FIELD, granule.resolved_collection_id())
        .with(PROVIDER_FIELD, granule.provider.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn granule(id: &str, collection_id: Option<&str>, provider: Option<&str>) -> Granule {
        let mut granule = Granule::new(id);
        granule.collection_id = collection_id.map(str::to_string);
        granule.provider = provider.map(str::to_string);
        granule
    }

    #[test]
    fn the_one_where_the_key_function_is_pure() {
        let g = granule("g-1", Some("A___1"), Some("prov"));
        assert_eq!(granule_group(&g), granule_group(&g));
        assert_eq!(granule_group(&g).key(), granule_group(&g).key());
    }

    #[test]
    fn the_one_where_empty_and_missing_fields_look_the_same() {
        let missing = GroupDescriptor::new().with("a", None::<String>).with("b", None::<String>);
        let empty = GroupDescriptor::new().with("a", Some("")).with("b", Some(""));
        assert_eq!(missing.key(), empty.key());
        assert!(missing.key().is_empty(), "all-absent descriptors yield the empty key");
    }

    #[test]
    fn the_one_where_concatenation_does_not_cause_identity_theft() {
        let left = GroupDescriptor::new().with("a", Some("ab")).with("b", Some("c"));
        let right = GroupDescriptor::new().with("a", Some("a")).with("b", Some("bc"));
        assert_ne!(left.key(), right.key());

        let only_a = GroupDescriptor::new().with("a", Some("x")).with("b", None::<String>);
        let only_b = GroupDescriptor::new().with("a", None::<String>).with("b", Some("x"));
        assert_ne!(only_a.key(), only_b.key());
    }

    #[test]
    fn the_one_where_the_descriptor_exposes_its_fields() {
        let mut g = granule("g-1", None, None);
        g.data_type = Some("MOD09GQ".to_string());
        g.version = Some("006".to_string());
        let descriptor = granule_group(&g);

        assert_eq!(descriptor.get(COLLECTION_ID_FIELD), Some("MOD09GQ___006"));
        assert_eq!(descriptor.get(PROVIDER_FIELD), None);
        let names: Vec<_> = descriptor.fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec![COLLECTION_ID_FIELD, PROVIDER_FIELD]);
    }
}

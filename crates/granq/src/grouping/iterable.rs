use std::collections::HashSet;

use super::{Chunked, GroupDescriptor, GroupKey, chunked};

/// 🧺 Lazily walks `items` once, yielding one [`Group`] per distinct key in first-seen order.
///
/// Holds a cursor, the key function, and the set of keys already handed out. That's it.
pub struct GroupAndChunk<'a, T, F> {
    items: &'a [T],
    key_fn: F,
    chunk_size: usize,
    cursor: usize,
    seen: HashSet<GroupKey>,
}

impl<'a, T, F> GroupAndChunk<'a, T, F>
where
    F: Fn(&T) -> GroupDescriptor + Clone,
{
    /// 🏗️ `chunk_size` of 0 is treated as 1: every item its own batch.
    pub fn new(items: &'a [T], key_fn: F, chunk_size: usize) -> Self {
        Self {
            items,
            key_fn,
            chunk_size: chunk_size.max(1),
            cursor: 0,
            seen: HashSet::new(),
        }
    }
}

impl<'a, T, F> Iterator for GroupAndChunk<'a, T, F>
where
    F: Fn(&T) -> GroupDescriptor + Clone,
{
    type Item = Group<'a, T, F>;

    fn next(&mut self) -> Option<Self::Item> {
        let items = self.items;
        while let Some(item) = items.get(self.cursor) {
            let start = self.cursor;
            self.cursor += 1;

            let descriptor = (self.key_fn)(item);
            let key = descriptor.key();
            if !self.seen.insert(key.clone()) {
                // 🔁 already handed out; that group's own re-scan will pick this item up
                continue;
            }

            let members = GroupMembers {
                items,
                key_fn: self.key_fn.clone(),
                key: key.clone(),
                cursor: start,
            };
            return Some(Group {
                descriptor,
                key,
                leader: item,
                chunks: chunked(members, self.chunk_size),
            });
        }
        None
    }
}

impl<T, F> std::fmt::Debug for GroupAndChunk<'_, T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 the key function is a closure and closures don't do Debug. fair.
        f.debug_struct("GroupAndChunk")
            .field("len", &self.items.len())
            .field("chunk_size", &self.chunk_size)
            .field("cursor", &self.cursor)
            .field("groups_seen", &self.seen.len())
            .finish()
    }
}

/// 📦 The batches of one group, built on demand.
pub type Chunks<'a, T, F> = Chunked<GroupMembers<'a, T, F>>;

/// 🧺 One distinct group: its descriptor, its first member, and its lazy batches.
pub struct Group<'a, T, F> {
    pub descriptor: GroupDescriptor,
    pub key: GroupKey,
    /// 🥇 The first item seen with this key. Handy for naming the group in errors.
    pub leader: &'a T,
    pub chunks: Chunks<'a, T, F>,
}

impl<T: std::fmt::Debug, F> std::fmt::Debug for Group<'_, T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("descriptor", &self.descriptor)
            .field("leader", &self.leader)
            .finish()
    }
}

/// 🔍 Filtered re-scan: every item from `cursor` onward whose key matches, in order.
///
/// Independent of the outer walk. Recomputes keys as it goes rather than remembering them.
pub struct GroupMembers<'a, T, F> {
    items: &'a [T],
    key_fn: F,
    key: GroupKey,
    cursor: usize,
}

impl<'a, T, F> Iterator for GroupMembers<'a, T, F>
where
    F: Fn(&T) -> GroupDescriptor,
{
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let items = self.items;
        while let Some(item) = items.get(self.cursor) {
            self.cursor += 1;
            if (self.key_fn)(item).key() == self.key {
                return Some(item);
            }
        }
        None
    }
}

impl<T, F> std::fmt::Debug for GroupMembers<'_, T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupMembers")
            .field("key", &self.key)
            .field("cursor", &self.cursor)
            .finish()
    }
}

//! Hash buckets of the buffer cache.
//!
//! A bucket owns the bookkeeping of the slots currently hashed to it: which
//! block each one holds, how many checkouts and pins reference it, and when
//! it was last released. Members are kept in recency order, most recently
//! released at the front. The bucket's mutex in the cache table guards all of
//! this; the payload itself lives in the slot arena behind the slot's own lock.

use crate::device::BlockKey;
use std::collections::VecDeque;

/// Bookkeeping for one slot, owned by whichever bucket the slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotMeta {
    /// Index of the slot in the arena
    pub index: usize,
    /// Block currently mapped to the slot, `None` if unassigned
    pub key: Option<BlockKey>,
    /// Number of checkouts plus pins
    pub refcnt: u32,
    /// Pins among `refcnt`
    pub pins: u32,
    /// Tick of the release that dropped `refcnt` to zero
    pub last_use: u64,
}

impl SlotMeta {
    /// An unassigned, unreferenced slot.
    pub fn free(index: usize) -> Self {
        Self {
            index,
            key: None,
            refcnt: 0,
            pins: 0,
            last_use: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Bucket {
    members: VecDeque<SlotMeta>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Member currently mapped to `key`.
    pub fn find(&self, key: BlockKey) -> Option<&SlotMeta> {
        self.members.iter().find(|m| m.key == Some(key))
    }

    pub fn find_mut(&mut self, key: BlockKey) -> Option<&mut SlotMeta> {
        self.members.iter_mut().find(|m| m.key == Some(key))
    }

    /// Member at arena index `index`.
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut SlotMeta> {
        self.members.iter_mut().find(|m| m.index == index)
    }

    /// Least recently released unreferenced member.
    ///
    /// Walks from the LRU end; on equal stamps the member closer to that end
    /// wins.
    pub fn lru_candidate(&self) -> Option<&SlotMeta> {
        let mut best: Option<&SlotMeta> = None;
        for meta in self.members.iter().rev() {
            if meta.refcnt == 0 && best.map_or(true, |b| meta.last_use < b.last_use) {
                best = Some(meta);
            }
        }
        best
    }

    /// Unlink member `index` if it is still here and unreferenced.
    pub fn unlink_if_free(&mut self, index: usize) -> Option<SlotMeta> {
        let pos = self
            .members
            .iter()
            .position(|m| m.index == index && m.refcnt == 0)?;
        self.members.remove(pos)
    }

    /// Link at the most recently used end.
    pub fn push_front(&mut self, meta: SlotMeta) {
        self.members.push_front(meta);
    }

    /// Link at the least recently used end.
    pub fn push_back(&mut self, meta: SlotMeta) {
        self.members.push_back(meta);
    }

    /// Move member `index` to the most recently used end.
    pub fn move_to_front(&mut self, index: usize) {
        if let Some(pos) = self.members.iter().position(|m| m.index == index) {
            if let Some(meta) = self.members.remove(pos) {
                self.members.push_front(meta);
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotMeta> {
        self.members.iter()
    }
}

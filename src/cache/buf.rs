//! Checked-out buffers.

use super::BufferCache;
use crate::device::{BlockDevice, BlockKey};
use crate::error::Result;
use std::marker::PhantomData;

/// Copyable token naming a slot and the block it holds.
///
/// A handle is obtained from a [`Buf`] and stays meaningful for as long as
/// the slot is referenced, which is what [`Buf::pin`] arranges. It lets a
/// collaborator unpin a block later without holding its lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufHandle {
    pub(crate) index: usize,
    pub(crate) key: BlockKey,
}

impl BufHandle {
    /// Block the handle refers to.
    pub fn key(&self) -> BlockKey {
        self.key
    }
}

/// A buffer slot checked out of a [`BufferCache`].
///
/// Holding a `Buf` means holding the slot's exclusive lock and one reference
/// on it. Dropping the `Buf` (or calling [`release`](Buf::release)) gives
/// both back. The lock belongs to the thread that took it, so `Buf` cannot be
/// sent to another thread.
pub struct Buf<'a, D: BlockDevice> {
    pub(crate) cache: &'a BufferCache<D>,
    pub(crate) index: usize,
    pub(crate) key: BlockKey,
    _not_send: PhantomData<*const ()>,
}

impl<'a, D: BlockDevice> Buf<'a, D> {
    /// Wrap slot `index`, whose exclusive lock the caller has just taken.
    pub(crate) fn new(cache: &'a BufferCache<D>, index: usize, key: BlockKey) -> Self {
        Self {
            cache,
            index,
            key,
            _not_send: PhantomData,
        }
    }

    /// Device id of the block.
    pub fn dev(&self) -> u32 {
        self.key.dev
    }

    /// Block number on the device.
    pub fn blockno(&self) -> u32 {
        self.key.blockno
    }

    /// The block this buffer holds.
    pub fn key(&self) -> BlockKey {
        self.key
    }

    /// Whether the payload reflects the on-disk content.
    pub fn is_valid(&self) -> bool {
        self.cache.slots[self.index].is_valid()
    }

    /// Handle naming this slot, for [`BufferCache::pin`] / [`BufferCache::unpin`].
    pub fn handle(&self) -> BufHandle {
        BufHandle {
            index: self.index,
            key: self.key,
        }
    }

    /// Block payload.
    pub fn data(&self) -> &[u8] {
        // SAFETY: a live Buf holds the slot's exclusive lock on this thread.
        unsafe { &self.cache.slots[self.index].data.get()[..] }
    }

    /// Mutable block payload.
    pub fn data_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `data`, and `&mut self` rules out other borrows.
        unsafe { &mut self.cache.slots[self.index].data.get_mut()[..] }
    }

    /// Write the payload through to the device.
    ///
    /// Validity, reference count and the lock are left as they are.
    pub fn write(&mut self) -> Result<()> {
        self.cache.write_slot(self.index, self.key)
    }

    /// Take an extra reference so the slot stays resident after release.
    ///
    /// Pair with [`BufferCache::unpin`] on the returned handle.
    pub fn pin(&self) -> BufHandle {
        let handle = self.handle();
        self.cache.pin(handle);
        handle
    }

    /// Give the buffer back to the cache.
    pub fn release(self) {
        drop(self)
    }
}

impl<D: BlockDevice> Drop for Buf<'_, D> {
    fn drop(&mut self) {
        self.cache.release_slot(self.index, self.key);
    }
}

impl<D: BlockDevice> std::fmt::Debug for Buf<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buf")
            .field("slot", &self.index)
            .field("key", &self.key)
            .field("valid", &self.is_valid())
            .finish()
    }
}

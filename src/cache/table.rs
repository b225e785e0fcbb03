//! The bucket table: slot pool, hash buckets and the checkout protocol.

use super::bucket::{Bucket, SlotMeta};
use super::buf::{Buf, BufHandle};
use super::slot::Slot;
use super::stats::{CacheStats, StatsCounters};
use crate::config::CacheOptions;
use crate::device::{BlockDevice, BlockKey};
use crate::error::{Error, Result};
use crossbeam::utils::CachePadded;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-capacity buffer cache in front of a [`BlockDevice`].
///
/// The pool of `nbuf` slots is spread over `buckets` hash buckets, each with
/// its own short-lived metadata lock. A slot is found by hashing its block
/// key; a miss recycles the least recently released unreferenced slot found
/// by scanning the buckets one at a time.
///
/// # Thread Safety
///
/// `BufferCache` is `Sync` and meant to be shared by reference or through
/// `Arc<BufferCache<D>>`. Checkouts of the same block are serialized by the
/// slot's exclusive lock; checkouts of different blocks proceed in parallel.
///
/// # Fatal conditions
///
/// These panics signal a defect in the caller, not a runtime condition:
///
/// - `"bget: no buffers"`: every slot is referenced when a miss needs one.
/// - `"bwrite"` / `"brelse"`: the caller does not hold the slot's lock.
/// - `"bpin"` / `"bunpin"`: the handle is stale, or unpin has no matching pin.
pub struct BufferCache<D: BlockDevice> {
    device: D,
    buckets: Box<[CachePadded<Mutex<Bucket>>]>,
    pub(super) slots: Box<[Slot]>,
    block_size: usize,
    /// Logical clock stamped on slots when their last reference goes away.
    ticks: AtomicU64,
    stats: StatsCounters,
}

impl<D: BlockDevice> BufferCache<D> {
    /// Build the table: `options.buckets` empty buckets and `options.nbuf`
    /// unassigned slots, all linked into bucket 0. No I/O is performed.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid or the device block size
    /// differs from `options.block_size`.
    ///
    /// # Example
    ///
    /// ```
    /// use bufcache::{BufferCache, CacheOptions, MemDevice};
    ///
    /// # fn main() -> Result<(), bufcache::Error> {
    /// let cache = BufferCache::new(MemDevice::new(1024), CacheOptions::default())?;
    /// assert_eq!(cache.capacity(), 30);
    ///
    /// let mut buf = cache.read(1, 5)?;
    /// buf.data_mut()[0] = 42;
    /// buf.write()?;
    /// buf.release();
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(device: D, options: CacheOptions) -> Result<Self> {
        options.validate()?;
        if device.block_size() != options.block_size {
            return Err(Error::BlockSizeMismatch {
                cache: options.block_size,
                device: device.block_size(),
            });
        }

        let buckets: Box<[CachePadded<Mutex<Bucket>>]> = (0..options.buckets)
            .map(|_| CachePadded::new(Mutex::new(Bucket::new())))
            .collect();
        let slots: Box<[Slot]> = (0..options.nbuf)
            .map(|_| Slot::new(options.block_size))
            .collect();

        {
            let mut first = buckets[0].lock();
            for index in 0..options.nbuf {
                first.push_front(SlotMeta::free(index));
            }
        }

        log::info!(
            "Buffer cache initialized: {} slots of {} bytes over {} buckets",
            options.nbuf,
            options.block_size,
            options.buckets
        );

        Ok(Self {
            device,
            buckets,
            slots,
            block_size: options.block_size,
            ticks: AtomicU64::new(0),
            stats: StatsCounters::default(),
        })
    }

    /// Build a table with [`CacheOptions::default`] sized to the device's
    /// block size.
    pub fn with_defaults(device: D) -> Result<Self> {
        let options = CacheOptions::default().block_size(device.block_size());
        Self::new(device, options)
    }

    /// Return a locked buffer holding the on-disk content of `(dev, blockno)`.
    ///
    /// Blocks the calling thread while another thread holds the same block.
    /// A block that is already valid in the cache is returned without I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the device read fails. The slot is released
    /// and stays invalid, so a later read retries the transfer.
    ///
    /// # Panics
    ///
    /// Panics if every slot is referenced and the block is not cached, or if
    /// the calling thread already holds this block.
    pub fn read(&self, dev: u32, blockno: u32) -> Result<Buf<'_, D>> {
        let key = BlockKey::new(dev, blockno);
        let mut buf = self.get(key);
        if !buf.is_valid() {
            if let Err(e) = self.device.read_block(key, buf.data_mut()) {
                log::warn!("Device read of {:?} failed: {}", key, e);
                return Err(e);
            }
            self.stats.record_device_read();
            self.slots[buf.index].set_valid(true);
        }
        Ok(buf)
    }

    /// Write `buf` through to the device. Same as [`Buf::write`].
    ///
    /// # Panics
    ///
    /// Panics if `buf` was checked out of a different cache.
    pub fn write(&self, buf: &mut Buf<'_, D>) -> Result<()> {
        if !std::ptr::eq(buf.cache, self) {
            log::error!("bwrite: {:?} belongs to another cache", buf.key);
            panic!("bwrite");
        }
        buf.write()
    }

    /// Give `buf` back. Same as [`Buf::release`].
    ///
    /// # Panics
    ///
    /// Panics if `buf` was checked out of a different cache.
    pub fn release(&self, buf: Buf<'_, D>) {
        if !std::ptr::eq(buf.cache, self) {
            log::error!("brelse: {:?} belongs to another cache", buf.key);
            panic!("brelse");
        }
        buf.release()
    }

    /// Take an extra reference on the slot named by `handle`.
    ///
    /// Does not touch the slot's lock or recency position. While the extra
    /// reference is held the slot is never recycled.
    ///
    /// # Panics
    ///
    /// Panics if the slot no longer holds the handle's block.
    pub fn pin(&self, handle: BufHandle) {
        let mut bucket = self.bucket_for(handle.key).lock();
        match bucket.slot_mut(handle.index) {
            Some(meta) if meta.key == Some(handle.key) => {
                meta.refcnt += 1;
                meta.pins += 1;
            }
            _ => {
                log::error!("bpin: stale handle for {:?}", handle.key);
                panic!("bpin");
            }
        }
    }

    /// Drop a reference taken by [`pin`](Self::pin) or [`Buf::pin`].
    ///
    /// # Panics
    ///
    /// Panics if the slot no longer holds the handle's block or has no
    /// outstanding pin. A checkout's own reference is never dropped here.
    pub fn unpin(&self, handle: BufHandle) {
        let mut bucket = self.bucket_for(handle.key).lock();
        match bucket.slot_mut(handle.index) {
            Some(meta) if meta.key == Some(handle.key) && meta.pins > 0 => {
                meta.pins -= 1;
                meta.refcnt -= 1;
            }
            _ => {
                log::error!("bunpin: no pin to drop for {:?}", handle.key);
                panic!("bunpin");
            }
        }
    }

    /// Whether `(dev, blockno)` is currently mapped to a slot.
    pub fn is_cached(&self, dev: u32, blockno: u32) -> bool {
        let key = BlockKey::new(dev, blockno);
        self.bucket_for(key).lock().find(key).is_some()
    }

    /// Reference count of the slot holding `(dev, blockno)`, if any.
    pub fn refcount(&self, dev: u32, blockno: u32) -> Option<u32> {
        let key = BlockKey::new(dev, blockno);
        self.bucket_for(key).lock().find(key).map(|m| m.refcnt)
    }

    /// Number of slots in the pool.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of hash buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Payload size of every slot.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The device behind the cache.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Get current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Reset cache statistics to zero.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Check the table's structural invariants, panicking on violation.
    ///
    /// Only meaningful while no other thread is inside the cache: a slot
    /// being recycled is briefly in no bucket.
    pub fn debug_validate_invariants(&self) {
        let mut seen = HashSet::new();
        let mut referenced = HashSet::new();
        for (b, bucket) in self.buckets.iter().enumerate() {
            let bucket = bucket.lock();
            for meta in bucket.iter() {
                assert!(seen.insert(meta.index), "slot {} linked twice", meta.index);
                match meta.key {
                    Some(key) => {
                        assert_eq!(
                            self.bucket_index(key),
                            b,
                            "slot {} in wrong bucket",
                            meta.index
                        );
                        assert!(meta.pins <= meta.refcnt, "slot {} pins exceed refcnt", meta.index);
                        if meta.refcnt > 0 {
                            assert!(referenced.insert(key), "{:?} referenced in two slots", key);
                        }
                    }
                    None => {
                        assert_eq!(b, 0, "unassigned slot {} outside bucket 0", meta.index);
                        assert_eq!(meta.refcnt, 0, "unassigned slot {} referenced", meta.index);
                    }
                }
            }
        }
        assert_eq!(seen.len(), self.slots.len(), "slots missing from buckets");
    }

    fn bucket_index(&self, key: BlockKey) -> usize {
        let hash = ((key.dev as u64) << 27) | key.blockno as u64;
        (hash % self.buckets.len() as u64) as usize
    }

    fn bucket_for(&self, key: BlockKey) -> &Mutex<Bucket> {
        &self.buckets[self.bucket_index(key)]
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Look up `key`, recycling a slot on a miss, and return it locked with
    /// one reference taken for the caller.
    fn get(&self, key: BlockKey) -> Buf<'_, D> {
        let target = self.bucket_for(key);

        {
            let mut bucket = target.lock();
            if let Some(meta) = bucket.find_mut(key) {
                meta.refcnt += 1;
                let index = meta.index;
                drop(bucket);
                self.stats.record_hit();
                log::trace!("Cache hit for {:?} in slot {}", key, index);
                return self.lock_slot(index, key);
            }
        }

        let victim = self.claim_victim();
        self.install(key, victim)
    }

    /// Map `key` to the unlinked `victim` and return it locked with one
    /// reference taken.
    ///
    /// If another thread cached `key` while no lock was held, that slot is
    /// returned instead and the victim goes back to the pool unassigned.
    fn install(&self, key: BlockKey, victim: SlotMeta) -> Buf<'_, D> {
        let mut bucket = self.bucket_for(key).lock();
        if let Some(meta) = bucket.find_mut(key) {
            meta.refcnt += 1;
            let index = meta.index;
            drop(bucket);
            self.stats.record_hit();
            log::debug!(
                "{:?} cached concurrently in slot {}; returning slot {} to the free list",
                key,
                index,
                victim.index
            );
            self.retire(victim);
            return self.lock_slot(index, key);
        }

        let index = victim.index;
        self.slots[index].set_valid(false);
        bucket.push_front(SlotMeta {
            index,
            key: Some(key),
            refcnt: 1,
            pins: 0,
            last_use: victim.last_use,
        });
        drop(bucket);

        self.stats.record_miss();
        if let Some(old) = victim.key {
            self.stats.record_eviction();
            log::debug!("Evicted {:?} from slot {} for {:?}", old, index, key);
        } else {
            log::trace!("Assigned free slot {} to {:?}", index, key);
        }
        self.lock_slot(index, key)
    }

    /// Find and unlink the unreferenced slot with the oldest release stamp.
    ///
    /// Buckets are visited one at a time and each lock is dropped before the
    /// next is taken. The winner's bucket is then locked again and the
    /// candidate re-checked; if it was taken meanwhile the scan restarts.
    fn claim_victim(&self) -> SlotMeta {
        loop {
            let mut best: Option<(usize, usize, u64)> = None;
            for (b, bucket) in self.buckets.iter().enumerate() {
                let bucket = bucket.lock();
                if let Some(meta) = bucket.lru_candidate() {
                    if best.map_or(true, |(_, _, stamp)| meta.last_use < stamp) {
                        best = Some((b, meta.index, meta.last_use));
                    }
                }
            }

            let Some((b, index, _)) = best else {
                log::error!(
                    "bget: all {} slots are referenced, cannot recycle",
                    self.slots.len()
                );
                panic!("bget: no buffers");
            };

            if let Some(meta) = self.buckets[b].lock().unlink_if_free(index) {
                return meta;
            }
            log::trace!("Victim slot {} claimed concurrently, rescanning", index);
        }
    }

    /// Return an unlinked slot to bucket 0 as unassigned.
    fn retire(&self, victim: SlotMeta) {
        self.slots[victim.index].set_valid(false);
        self.buckets[0].lock().push_back(SlotMeta {
            key: None,
            refcnt: 0,
            pins: 0,
            ..victim
        });
    }

    fn lock_slot(&self, index: usize, key: BlockKey) -> Buf<'_, D> {
        self.slots[index].data.acquire();
        Buf::new(self, index, key)
    }

    pub(super) fn write_slot(&self, index: usize, key: BlockKey) -> Result<()> {
        let slot = &self.slots[index];
        if !slot.data.holding() {
            log::error!("bwrite: {:?} (slot {}) not locked by caller", key, index);
            panic!("bwrite");
        }
        // SAFETY: the current thread holds the slot's lock.
        let data = unsafe { &slot.data.get()[..] };
        if let Err(e) = self.device.write_block(key, data) {
            log::warn!("Device write of {:?} failed: {}", key, e);
            return Err(e);
        }
        self.stats.record_device_write();
        Ok(())
    }

    pub(super) fn release_slot(&self, index: usize, key: BlockKey) {
        let slot = &self.slots[index];
        if !slot.data.holding() {
            log::error!("brelse: {:?} (slot {}) not locked by caller", key, index);
            panic!("brelse");
        }
        slot.data.release();

        let mut bucket = self.bucket_for(key).lock();
        let Some(meta) = bucket.slot_mut(index) else {
            log::error!("brelse: slot {} missing from the bucket of {:?}", index, key);
            panic!("brelse");
        };
        let Some(refcnt) = meta.refcnt.checked_sub(1).filter(|&n| n >= meta.pins) else {
            log::error!("brelse: {:?} (slot {}) has no checkout to drop", key, index);
            panic!("brelse");
        };
        meta.refcnt = refcnt;
        if meta.refcnt == 0 {
            meta.last_use = self.next_tick();
            bucket.move_to_front(index);
        }
    }
}

impl<D: BlockDevice> std::fmt::Debug for BufferCache<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("capacity", &self.slots.len())
            .field("buckets", &self.buckets.len())
            .field("block_size", &self.block_size)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

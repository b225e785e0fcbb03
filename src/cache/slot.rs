//! Buffer slots: the in-memory mirrors of disk blocks.

use crate::sync::SleepLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// One entry of the slot arena.
///
/// The payload sits behind the slot's exclusive lock. The validity flag is
/// cleared by the allocator under a bucket lock while nobody references the
/// slot, and set by the reader holding the exclusive lock, so it is atomic
/// rather than protected by either lock alone.
#[derive(Debug)]
pub(crate) struct Slot {
    valid: AtomicBool,
    pub data: SleepLock<Box<[u8]>>,
}

impl Slot {
    pub fn new(block_size: usize) -> Self {
        Self {
            valid: AtomicBool::new(false),
            data: SleepLock::new(vec![0u8; block_size].into_boxed_slice()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }
}

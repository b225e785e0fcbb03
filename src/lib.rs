//! # bufcache - A Concurrent Block Buffer Cache
//!
//! bufcache keeps a fixed number of disk blocks in memory between a
//! filesystem layer and a block device. It deduplicates concurrent access to
//! the same block, serializes mutation of each block's content, and recycles
//! the least recently released buffer when a block that is not cached is
//! requested.
//!
//! ## Architecture
//!
//! - **Buffer slots**: block-sized payloads, each behind its own exclusive
//!   [`SleepLock`](sync::SleepLock)
//! - **Buckets**: hash partitions of the slot pool, each with a short-lived
//!   metadata lock and a recency-ordered member list
//! - **Bucket table**: the [`BufferCache`] itself, owning buckets, slots and
//!   the [`BlockDevice`] it reads from and writes to
//! - **Eviction**: a cross-bucket scan for the unreferenced slot released
//!   longest ago, holding one bucket lock at a time
//!
//! ## Example Usage
//!
//! ```rust
//! use bufcache::{BufferCache, CacheOptions, MemDevice};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), bufcache::Error> {
//! let options = CacheOptions::new().nbuf(16).block_size(512);
//! let cache = Arc::new(BufferCache::new(MemDevice::new(512), options)?);
//!
//! // Read, modify and write back a block
//! let mut buf = cache.read(1, 5)?;
//! buf.data_mut()[..5].copy_from_slice(b"hello");
//! buf.write()?;
//! buf.release();
//!
//! // A second read is served from memory
//! let buf = cache.read(1, 5)?;
//! assert_eq!(&buf.data()[..5], b"hello");
//! assert_eq!(cache.device().total_reads(), 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod sync;

// Re-exports
pub use cache::{Buf, BufHandle, BufferCache, CacheStats};
pub use config::CacheOptions;
pub use device::{BlockDevice, BlockKey, FileDevice, IoCounts, MemDevice};
pub use error::{Error, Result};

//! Block buffer cache.
//!
//! Keeps a fixed pool of block-sized buffers between a filesystem and a
//! [`BlockDevice`](crate::BlockDevice). Each cached block lives in exactly one
//! slot, every slot carries its own exclusive lock, and slot bookkeeping is
//! sharded over hash buckets so lookups of unrelated blocks do not contend.
//!
//! Protocol for consumers:
//!
//! 1. [`BufferCache::read`] returns a locked [`Buf`] with the block's content.
//! 2. Mutate the payload through [`Buf::data_mut`], then [`Buf::write`] it.
//! 3. [`Buf::release`] (or drop) the buffer as soon as possible; other
//!    threads wanting the same block wait until then.
//!
//! [`Buf::pin`] keeps a block resident across a longer operation without
//! holding its lock; undo it with [`BufferCache::unpin`].

mod bucket;
mod buf;
mod slot;
mod stats;
mod table;

pub use buf::{Buf, BufHandle};
pub use stats::CacheStats;
pub use table::BufferCache;

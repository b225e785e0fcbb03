//! Block device abstraction consumed by the buffer cache.
//!
//! The cache never touches storage directly. It asks a [`BlockDevice`] to
//! transfer exactly one block at a time, synchronously, identified by a
//! [`BlockKey`]. Two implementations ship with the crate:
//!
//! - [`MemDevice`]: a sparse in-memory store that counts every transfer,
//!   useful for tests and for observing cache hits.
//! - [`FileDevice`]: one image file per device id inside a directory.

use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Identifies one block: a device id and a block number on that device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey {
    /// Device id
    pub dev: u32,
    /// Block number on the device
    pub blockno: u32,
}

impl BlockKey {
    /// Create a new block key
    pub fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

/// Synchronous, single-block storage primitive.
///
/// Implementations must be safe to call from several threads at once; the
/// cache only guarantees that two transfers for the same block never overlap.
pub trait BlockDevice: Send + Sync {
    /// Size of one block in bytes.
    fn block_size(&self) -> usize;

    /// Read block `key` into `buf`. `buf.len()` equals [`block_size`](Self::block_size).
    fn read_block(&self, key: BlockKey, buf: &mut [u8]) -> Result<()>;

    /// Write `buf` to block `key`. `buf.len()` equals [`block_size`](Self::block_size).
    fn write_block(&self, key: BlockKey, buf: &[u8]) -> Result<()>;

    /// Flush any buffering below the device interface.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Per-block transfer counters kept by [`MemDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoCounts {
    /// Number of completed block reads
    pub reads: u64,
    /// Number of completed block writes
    pub writes: u64,
}

/// In-memory block device.
///
/// Blocks that were never written read back as zeroes. Every transfer is
/// counted, both in total and per block, and reads or writes can be made to
/// fail on demand.
#[derive(Debug)]
pub struct MemDevice {
    block_size: usize,
    blocks: Mutex<HashMap<BlockKey, Box<[u8]>>>,
    counts: Mutex<HashMap<BlockKey, IoCounts>>,
    total_reads: AtomicU64,
    total_writes: AtomicU64,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemDevice {
    /// Create an empty device with the given block size.
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Mutex::new(HashMap::new()),
            counts: Mutex::new(HashMap::new()),
            total_reads: AtomicU64::new(0),
            total_writes: AtomicU64::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Store `data` as the content of `key` without going through the
    /// counters. Shorter data is zero-padded.
    pub fn preload(&self, key: BlockKey, data: &[u8]) {
        let mut block = vec![0u8; self.block_size].into_boxed_slice();
        let n = data.len().min(self.block_size);
        block[..n].copy_from_slice(&data[..n]);
        self.blocks.lock().insert(key, block);
    }

    /// Current on-device content of `key`.
    pub fn contents(&self, key: BlockKey) -> Vec<u8> {
        self.blocks
            .lock()
            .get(&key)
            .map(|b| b.to_vec())
            .unwrap_or_else(|| vec![0u8; self.block_size])
    }

    /// Transfer counts for one block.
    pub fn io_counts(&self, key: BlockKey) -> IoCounts {
        self.counts.lock().get(&key).copied().unwrap_or_default()
    }

    /// Total completed reads across all blocks.
    pub fn total_reads(&self) -> u64 {
        self.total_reads.load(Ordering::Relaxed)
    }

    /// Total completed writes across all blocks.
    pub fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::Relaxed)
    }

    /// Reset all transfer counters to zero.
    pub fn reset_counts(&self) {
        self.counts.lock().clear();
        self.total_reads.store(0, Ordering::Relaxed);
        self.total_writes.store(0, Ordering::Relaxed);
    }

    /// Make subsequent reads fail with an I/O error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make subsequent writes fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(Error::invalid_argument(format!(
                "buffer of {} bytes for a {} byte block",
                len, self.block_size
            )));
        }
        Ok(())
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, key: BlockKey, buf: &mut [u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(Error::io(ErrorKind::Other, format!("injected read failure at {:?}", key)));
        }

        match self.blocks.lock().get(&key) {
            Some(block) => buf.copy_from_slice(block),
            None => buf.fill(0),
        }

        self.counts.lock().entry(key).or_default().reads += 1;
        self.total_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, key: BlockKey, buf: &[u8]) -> Result<()> {
        self.check_len(buf.len())?;
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::io(ErrorKind::Other, format!("injected write failure at {:?}", key)));
        }

        self.blocks.lock().insert(key, buf.to_vec().into_boxed_slice());

        self.counts.lock().entry(key).or_default().writes += 1;
        self.total_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// File-backed block device.
///
/// Device id `n` maps to `<dir>/dev-<n>.img`, created on first use. Block
/// `b` lives at byte offset `b * block_size`. Reads past the end of a file
/// return zeroes.
#[derive(Debug)]
pub struct FileDevice {
    dir: PathBuf,
    block_size: usize,
    files: Mutex<HashMap<u32, File>>,
}

impl FileDevice {
    /// Open a device rooted at `dir`, creating the directory if needed.
    pub fn open<P: AsRef<Path>>(dir: P, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::invalid_argument("block_size must be > 0"));
        }
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        log::info!("Opened file device at {:?} ({} byte blocks)", dir, block_size);
        Ok(Self {
            dir,
            block_size,
            files: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the image file backing `dev`.
    pub fn image_path(&self, dev: u32) -> PathBuf {
        self.dir.join(format!("dev-{}.img", dev))
    }

    fn with_file<T>(&self, dev: u32, f: impl FnOnce(&mut File) -> std::io::Result<T>) -> Result<T> {
        let mut files = self.files.lock();
        let file = match files.entry(dev) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(self.image_path(dev))?;
                e.insert(file)
            }
        };
        Ok(f(file)?)
    }

    fn offset(&self, blockno: u32) -> u64 {
        blockno as u64 * self.block_size as u64
    }
}

impl BlockDevice for FileDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read_block(&self, key: BlockKey, buf: &mut [u8]) -> Result<()> {
        let offset = self.offset(key.blockno);
        self.with_file(key.dev, |file| {
            file.seek(SeekFrom::Start(offset))?;
            let mut filled = 0;
            while filled < buf.len() {
                match file.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }
            buf[filled..].fill(0);
            Ok(())
        })
    }

    fn write_block(&self, key: BlockKey, buf: &[u8]) -> Result<()> {
        let offset = self.offset(key.blockno);
        self.with_file(key.dev, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(buf)
        })
    }

    fn flush(&self) -> Result<()> {
        for file in self.files.lock().values() {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mem_device_unwritten_reads_zero() {
        let dev = MemDevice::new(16);
        let mut buf = [0xffu8; 16];
        dev.read_block(BlockKey::new(1, 2), &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);
        assert_eq!(dev.io_counts(BlockKey::new(1, 2)), IoCounts { reads: 1, writes: 0 });
    }

    #[test]
    fn test_mem_device_write_then_read() {
        let dev = MemDevice::new(8);
        let key = BlockKey::new(0, 7);
        dev.write_block(key, b"abcdefgh").unwrap();

        let mut buf = [0u8; 8];
        dev.read_block(key, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdefgh");
        assert_eq!(dev.total_reads(), 1);
        assert_eq!(dev.total_writes(), 1);

        dev.reset_counts();
        assert_eq!(dev.io_counts(key), IoCounts::default());
        assert_eq!(dev.contents(key), b"abcdefgh".to_vec());
    }

    #[test]
    fn test_mem_device_rejects_wrong_length() {
        let dev = MemDevice::new(8);
        let mut buf = [0u8; 4];
        assert!(dev.read_block(BlockKey::new(0, 0), &mut buf).is_err());
        assert_eq!(dev.total_reads(), 0);
    }

    #[test]
    fn test_mem_device_injected_failures() {
        let dev = MemDevice::new(4);
        dev.set_fail_writes(true);
        assert!(matches!(
            dev.write_block(BlockKey::new(0, 0), &[1, 2, 3, 4]),
            Err(Error::Io(_))
        ));
        dev.set_fail_writes(false);
        dev.set_fail_reads(true);
        let mut buf = [0u8; 4];
        assert!(dev.read_block(BlockKey::new(0, 0), &mut buf).is_err());
        assert_eq!(dev.total_writes(), 0);
    }

    #[test]
    fn test_file_device_round_trip() {
        let dir = TempDir::new().unwrap();
        let dev = FileDevice::open(dir.path(), 32).unwrap();

        let data = [7u8; 32];
        dev.write_block(BlockKey::new(2, 3), &data).unwrap();
        dev.flush().unwrap();

        let mut buf = [0u8; 32];
        dev.read_block(BlockKey::new(2, 3), &mut buf).unwrap();
        assert_eq!(buf, data);

        // Blocks before the written one exist as a hole, those after as EOF.
        dev.read_block(BlockKey::new(2, 1), &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);
        dev.read_block(BlockKey::new(2, 9), &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);

        assert!(dev.image_path(2).exists());
        assert!(!dev.image_path(1).exists());
    }

    #[test]
    fn test_file_device_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let dev = FileDevice::open(dir.path(), 16).unwrap();
            dev.write_block(BlockKey::new(0, 1), &[9u8; 16]).unwrap();
            dev.flush().unwrap();
        }
        let dev = FileDevice::open(dir.path(), 16).unwrap();
        let mut buf = [0u8; 16];
        dev.read_block(BlockKey::new(0, 1), &mut buf).unwrap();
        assert_eq!(buf, [9u8; 16]);
    }
}

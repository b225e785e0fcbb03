//! Basic usage example for bufcache
//!
//! This example demonstrates the checkout protocol:
//! - Building a cache over a file-backed device
//! - Reading, modifying and writing back a block
//! - Pinning a block across releases
//! - Observing hits, misses and evictions
//!
//! Run with `RUST_LOG=debug cargo run --example basic` to see evictions.

use anyhow::Context;
use bufcache::{BlockDevice, BufferCache, CacheOptions, FileDevice};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let dir = std::env::temp_dir().join("bufcache_example");
    let options = CacheOptions::new().nbuf(8).buckets(3).block_size(512);

    let device = FileDevice::open(&dir, options.block_size)
        .with_context(|| format!("opening device directory {:?}", dir))?;
    let cache = BufferCache::new(device, options)?;
    println!("Cache ready: {:?}", cache);

    // Write a greeting into block (1, 5)
    println!("\n=== Writing ===");
    let mut buf = cache.read(1, 5)?;
    let greeting = b"hello from block five";
    buf.data_mut()[..greeting.len()].copy_from_slice(greeting);
    buf.write()?;
    let handle = buf.pin();
    buf.release();
    println!("Wrote and pinned block (1, 5)");

    // Churn more blocks than the pool holds
    println!("\n=== Churning ===");
    for blockno in 0..32 {
        cache.read(2, blockno)?.release();
    }
    println!("(1, 5) still cached while pinned: {}", cache.is_cached(1, 5));

    cache.unpin(handle);
    for blockno in 32..48 {
        cache.read(2, blockno)?.release();
    }
    println!("(1, 5) cached after unpin and churn: {}", cache.is_cached(1, 5));

    // Reading it back goes to the device if it was evicted
    println!("\n=== Reading ===");
    let buf = cache.read(1, 5)?;
    println!(
        "Block (1, 5): {:?}",
        String::from_utf8_lossy(&buf.data()[..greeting.len()])
    );
    buf.release();

    let stats = cache.stats();
    println!("\n=== Statistics ===");
    println!("Lookups:   {}", stats.lookups);
    println!("Hits:      {} ({:.1}%)", stats.hits, stats.hit_rate() * 100.0);
    println!("Evictions: {}", stats.evictions);
    println!("Reads:     {}", stats.device_reads);
    println!("Writes:    {}", stats.device_writes);

    cache.device().flush()?;
    Ok(())
}

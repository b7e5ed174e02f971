//! Free data block management
//!
//! The superblock caches up to 50 free block numbers. When the cache runs
//! dry, the last block handed out carries a free-list page (count plus 50
//! numbers) that refills it. When the cache overflows, it is written as a
//! page into the block being freed, which then heads the new cache. A zero
//! entry at the bottom of the chain marks the end of the free list.
//!
//! Both operations store the superblock after every attempt, including
//! failed ones, so the on-disk counters always reflect what was tried.

use log::{debug, warn};

use crate::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::error::{FsError, Result};
use crate::format::{BlockNo, FreeCache, Superblock};

/// Allocate a zero-filled data block
pub fn alloc_block<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock) -> Result<BlockNo> {
    let result = take_free_block(dev, sb);
    persist(dev, sb, result)
}

/// Return a data block to the free list
pub fn free_block<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, block: BlockNo) -> Result<()> {
    let result = release_block(dev, sb, block);
    persist(dev, sb, result)
}

fn persist<D: BlockDevice + ?Sized, T>(dev: &mut D, sb: &Superblock, result: Result<T>) -> Result<T> {
    match (result, sb.store(dev)) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), stored) => {
            if let Err(store_err) = stored {
                warn!("block allocator: superblock store failed after error: {}", store_err);
            }
            Err(e)
        }
    }
}

fn take_free_block<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock) -> Result<BlockNo> {
    if sb.free_blocks == 0 {
        return Err(FsError::NoSpace);
    }

    let block = sb.free_cache.pop().ok_or_else(|| {
        warn!(
            "block allocator: cache count {} with {} free blocks",
            sb.free_cache.count, sb.free_blocks
        );
        FsError::Corrupt(format!("free block cache count {}", sb.free_cache.count))
    })?;

    if block == 0 {
        // Reached the end of the chain early
        sb.free_cache.count += 1;
        warn!(
            "block allocator: free list exhausted with {} blocks still counted free",
            sb.free_blocks
        );
        return Err(FsError::NoSpace);
    }
    if !sb.is_data_block(block) {
        sb.free_cache.count += 1;
        return Err(FsError::Corrupt(format!(
            "free list holds block {} outside the data area",
            block
        )));
    }

    sb.free_blocks -= 1;

    if sb.free_cache.is_empty() {
        let mut page = [0u8; BLOCK_SIZE];
        dev.read_block(block as u64, &mut page)?;
        sb.free_cache = FreeCache::from_page(&page)?;
        debug!(
            "block allocator: refilled cache with {} entries from block {}",
            sb.free_cache.len(),
            block
        );
        if !sb.free_cache.is_sane() {
            warn!(
                "block allocator: free-list page in block {} has count {}",
                block, sb.free_cache.count
            );
        }
    }

    dev.write_block(block as u64, &[0u8; BLOCK_SIZE])?;
    debug!("block allocator: allocated block {} ({} left)", block, sb.free_blocks);
    Ok(block)
}

fn release_block<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, block: BlockNo) -> Result<()> {
    if !sb.is_data_block(block) {
        return Err(FsError::Corrupt(format!(
            "attempt to free block {} outside the data area",
            block
        )));
    }
    if !sb.free_cache.is_sane() {
        return Err(FsError::Corrupt(format!(
            "free block cache count {}",
            sb.free_cache.count
        )));
    }

    if sb.free_cache.is_full() {
        dev.write_block(block as u64, &sb.free_cache.to_page()?)?;
        sb.free_cache.clear();
        debug!("block allocator: flushed full cache into block {}", block);
    }

    sb.free_cache.push(block);
    sb.free_blocks = sb.free_blocks.saturating_add(1);
    debug!("block allocator: freed block {} ({} free)", block, sb.free_blocks);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemoryBlockDevice;
    use crate::config::{FormatConfig, SizeSpec};
    use crate::format::mkfs;

    /// 64 blocks, 2 inode blocks: data area 4..64, root directory in block 4
    fn setup() -> (MemoryBlockDevice, Superblock) {
        let mut dev = MemoryBlockDevice::in_memory(64);
        let config = FormatConfig {
            image_size: SizeSpec::from_blocks(64),
            inode_size: SizeSpec::from_blocks(2),
            reserved_size: SizeSpec::from_blocks(0),
        };
        let sb = mkfs(&mut dev, &config).unwrap();
        (dev, sb)
    }

    #[test]
    fn test_lowest_blocks_come_first_and_are_zeroed() {
        let (mut dev, mut sb) = setup();
        dev.write_block(5, &[0xCC; BLOCK_SIZE]).unwrap();

        let block = alloc_block(&mut dev, &mut sb).unwrap();
        assert_eq!(block, 5);
        assert_eq!(sb.free_blocks, 58);

        let mut buf = [0xFFu8; BLOCK_SIZE];
        dev.read_block(5, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));

        assert_eq!(Superblock::load(&mut dev).unwrap(), sb);
    }

    #[test]
    fn test_exhaustion_reports_no_space() {
        let (mut dev, mut sb) = setup();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..59 {
            let block = alloc_block(&mut dev, &mut sb).unwrap();
            assert!((5..64).contains(&block));
            assert!(seen.insert(block));
        }
        assert_eq!(sb.free_blocks, 0);
        assert!(matches!(alloc_block(&mut dev, &mut sb), Err(FsError::NoSpace)));
        assert_eq!(Superblock::load(&mut dev).unwrap().free_blocks, 0);
    }

    #[test]
    fn test_empty_cache_with_free_blocks_is_corruption() {
        let (mut dev, mut sb) = setup();
        sb.free_cache.count = 0;
        let err = alloc_block(&mut dev, &mut sb).unwrap_err();
        assert!(err.is_corruption());
        // the attempted state is persisted
        assert_eq!(Superblock::load(&mut dev).unwrap().free_cache.count, 0);
    }

    #[test]
    fn test_sentinel_stops_allocation() {
        let (mut dev, mut sb) = setup();
        sb.free_cache.clear();
        sb.free_cache.push(0);
        let err = alloc_block(&mut dev, &mut sb).unwrap_err();
        assert!(err.is_no_space());
        assert_eq!(sb.free_cache.count, 1);
        assert_eq!(sb.free_blocks, 59);
    }

    #[test]
    fn test_freeing_outside_data_area_is_rejected() {
        let (mut dev, mut sb) = setup();
        for block in [0u16, 1, 3, 64] {
            assert!(free_block(&mut dev, &mut sb, block).unwrap_err().is_corruption());
        }
        assert_eq!(sb.free_blocks, 59);
    }

    #[test]
    fn test_free_then_alloc_reuses_block() {
        let (mut dev, mut sb) = setup();
        let a = alloc_block(&mut dev, &mut sb).unwrap();
        let b = alloc_block(&mut dev, &mut sb).unwrap();
        free_block(&mut dev, &mut sb, a).unwrap();
        assert_eq!(sb.free_blocks, 58);
        assert_eq!(alloc_block(&mut dev, &mut sb).unwrap(), a);
        assert_ne!(a, b);
    }
}

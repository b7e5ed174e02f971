//! Free inode management
//!
//! Unlike blocks, free inodes are not chained on disk: a record is free when
//! its mode and link count are both zero. The superblock caches up to 50
//! free numbers and the cache is refilled by scanning the inode area.

use std::io::Cursor;

use log::{debug, warn};

use crate::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::error::{FsError, Result};
use crate::format::{Inode, InodeNo, Superblock, INODES_PER_BLOCK, INODE_SIZE, ROOT_INODE};

/// Allocate an inode number
///
/// The record itself is left untouched; the caller initialises and stores it.
pub fn alloc_inode<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock) -> Result<InodeNo> {
    let result = take_free_inode(dev, sb);
    let stored = sb.store(dev);
    let ino = result?;
    stored?;
    Ok(ino)
}

/// Release inode `ino` and zero its record
pub fn free_inode<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, ino: InodeNo) -> Result<()> {
    if ino <= ROOT_INODE || ino as u32 >= sb.inode_capacity() {
        return Err(FsError::InvalidInode(ino as u32));
    }

    sb.free_inodes = sb.free_inodes.saturating_add(1);
    if sb.inode_cache.is_sane() {
        sb.inode_cache.push(ino);
    }
    let zeroed = Inode::default().store(dev, sb, ino);
    sb.store(dev)?;
    zeroed?;

    debug!("inode allocator: freed inode {} ({} free)", ino, sb.free_inodes);
    Ok(())
}

fn take_free_inode<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock) -> Result<InodeNo> {
    if sb.free_inodes == 0 {
        return Err(FsError::NoSpace);
    }
    if !sb.inode_cache.is_sane() {
        return Err(FsError::Corrupt(format!(
            "free inode cache count {}",
            sb.inode_cache.count
        )));
    }

    if sb.inode_cache.is_empty() {
        refill_cache(dev, sb)?;
    }

    let ino = match sb.inode_cache.pop() {
        Some(ino) => ino,
        None => {
            warn!(
                "inode allocator: no free records found with {} inodes counted free",
                sb.free_inodes
            );
            return Err(FsError::NoSpace);
        }
    };

    if ino <= ROOT_INODE || ino as u32 >= sb.inode_capacity() {
        return Err(FsError::Corrupt(format!("free inode cache holds inode {}", ino)));
    }

    sb.free_inodes -= 1;
    debug!("inode allocator: allocated inode {} ({} left)", ino, sb.free_inodes);
    Ok(ino)
}

/// Scan the inode area from inode 2 upwards, one inode block at a time
fn refill_cache<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock) -> Result<()> {
    let capacity = sb.inode_capacity();
    let mut block = [0u8; BLOCK_SIZE];

    'scan: for block_idx in 0..sb.inode_blocks as u32 {
        dev.read_block(sb.first_inode_block as u64 + block_idx as u64, &mut block)?;

        for slot in 0..INODES_PER_BLOCK as u32 {
            let ino = block_idx * INODES_PER_BLOCK as u32 + slot;
            if ino <= ROOT_INODE as u32 || ino >= capacity {
                continue;
            }
            let offset = slot as usize * INODE_SIZE;
            let record = Inode::read_from(&mut Cursor::new(&block[offset..offset + INODE_SIZE]))?;
            if record.is_free() && !sb.inode_cache.push(ino as InodeNo) {
                break 'scan;
            }
        }
    }

    debug!("inode allocator: scan found {} free inodes", sb.inode_cache.len());
    Ok(())
}

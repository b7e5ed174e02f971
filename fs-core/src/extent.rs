//! File extent management: growing and imploding a file's block tree

use log::{debug, warn};

use crate::block_alloc::{alloc_block, free_block};
use crate::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::codec;
use crate::error::{FsError, Result};
use crate::format::{
    fit_bytes, Inode, InodeNo, Superblock, DIRECT_BLOCKS, DOUBLE_INDIRECT_SLOT,
    DOUBLE_INDIRECT_START, MAX_FILE_BLOCKS, POINTERS_PER_BLOCK, SINGLE_INDIRECT_SLOT,
};
use crate::inode_alloc::free_inode;
use crate::layout::{read_index, translate_write, write_index, BlockTier};

/// Grow inode `ino` so that it holds `new_len` bytes
///
/// New blocks are allocated rank by rank. Index blocks are allocated the
/// first time a rank needs them: the single-indirect index for rank 18, the
/// top double-indirect index for rank 274, and a second-level index the
/// first time its 256-block group is touched. An index is present exactly
/// when its slot or top-index entry is non-zero.
///
/// If allocation fails part way, the inode is still stored with its size
/// clamped to the blocks actually obtained, and the error is returned.
pub fn grow<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, ino: InodeNo, new_len: i32) -> Result<()> {
    if new_len < 0 {
        return Err(FsError::InvalidArgument(format!("negative length {}", new_len)));
    }
    let new_blocks = fit_bytes(new_len);
    if new_blocks > MAX_FILE_BLOCKS {
        return Err(FsError::OutOfRange(new_blocks - 1));
    }

    let mut inode = Inode::load(dev, sb, ino)?;
    let old_blocks = inode.block_count();

    if new_blocks < old_blocks {
        return Err(FsError::InvalidArgument(format!(
            "inode {} holds {} blocks, cannot shrink to {}",
            ino, old_blocks, new_blocks
        )));
    }
    if new_blocks == old_blocks {
        if new_len > inode.size {
            inode.size = new_len;
            inode.store(dev, sb, ino)?;
        }
        return Ok(());
    }

    let mut obtained = old_blocks;
    let result = extend(dev, sb, &mut inode, old_blocks, new_blocks, &mut obtained);

    inode.size = match &result {
        Ok(()) => new_len,
        Err(_) => new_len.min(obtained as i32 * BLOCK_SIZE as i32),
    };
    inode.store(dev, sb, ino)?;
    sb.store(dev)?;

    match result {
        Ok(()) => {
            debug!("extent: inode {} grown from {} to {} blocks", ino, old_blocks, new_blocks);
            Ok(())
        }
        Err(e) => {
            warn!(
                "extent: inode {} stopped at {} of {} blocks: {}",
                ino, obtained, new_blocks, e
            );
            Err(e)
        }
    }
}

fn extend<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &mut Superblock,
    inode: &mut Inode,
    from: u32,
    to: u32,
    obtained: &mut u32,
) -> Result<()> {
    for rank in from..to {
        ensure_index(dev, sb, inode, rank)?;
        let leaf = alloc_block(dev, sb)?;
        translate_write(dev, inode, rank, leaf)?;
        *obtained = rank + 1;
    }
    Ok(())
}

/// Allocate whatever index blocks `rank` needs and does not have yet
fn ensure_index<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &mut Superblock,
    inode: &mut Inode,
    rank: u32,
) -> Result<()> {
    match BlockTier::of_rank(rank)? {
        BlockTier::Direct(_) => {}
        BlockTier::Single(_) => {
            if inode.addr[SINGLE_INDIRECT_SLOT] == 0 {
                inode.addr[SINGLE_INDIRECT_SLOT] = alloc_block(dev, sb)?;
                debug!("extent: single-indirect index in block {}", inode.addr[SINGLE_INDIRECT_SLOT]);
            }
        }
        BlockTier::Double { group, .. } => {
            if inode.addr[DOUBLE_INDIRECT_SLOT] == 0 {
                inode.addr[DOUBLE_INDIRECT_SLOT] = alloc_block(dev, sb)?;
                debug!("extent: double-indirect index in block {}", inode.addr[DOUBLE_INDIRECT_SLOT]);
            }
            let top_block = inode.addr[DOUBLE_INDIRECT_SLOT];
            let mut top = read_index(dev, top_block)?;
            if codec::index_entry(&top, group) == 0 {
                let second = alloc_block(dev, sb)?;
                codec::set_index_entry(&mut top, group, second);
                write_index(dev, top_block, &top)?;
                debug!("extent: second-level index {} in block {}", group, second);
            }
        }
    }
    Ok(())
}

/// Free every block of inode `ino` and reset its size to 0
///
/// Leaves go first (direct, single-indirect, double-indirect), then the
/// index blocks. Any non-zero index slot is freed even when the size does
/// not reach it. A failure aborts without storing the inode.
pub fn implode<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, ino: InodeNo) -> Result<()> {
    let mut inode = Inode::load(dev, sb, ino)?;
    let blocks = inode.block_count().min(MAX_FILE_BLOCKS) as usize;

    for slot in 0..blocks.min(DIRECT_BLOCKS) {
        free_block(dev, sb, inode.addr[slot])?;
    }

    if blocks > DIRECT_BLOCKS {
        let index = read_index(dev, inode.addr[SINGLE_INDIRECT_SLOT])?;
        for entry in 0..(blocks - DIRECT_BLOCKS).min(POINTERS_PER_BLOCK) {
            free_block(dev, sb, codec::index_entry(&index, entry))?;
        }
    }

    let double_start = DOUBLE_INDIRECT_START as usize;
    if blocks > double_start {
        let top = read_index(dev, inode.addr[DOUBLE_INDIRECT_SLOT])?;
        let leaves = blocks - double_start;
        for group in 0..(leaves + POINTERS_PER_BLOCK - 1) / POINTERS_PER_BLOCK {
            let second = read_index(dev, codec::index_entry(&top, group))?;
            let in_group = (leaves - group * POINTERS_PER_BLOCK).min(POINTERS_PER_BLOCK);
            for entry in 0..in_group {
                free_block(dev, sb, codec::index_entry(&second, entry))?;
            }
        }
    }

    if inode.addr[SINGLE_INDIRECT_SLOT] != 0 {
        free_block(dev, sb, inode.addr[SINGLE_INDIRECT_SLOT])?;
    }
    if inode.addr[DOUBLE_INDIRECT_SLOT] != 0 {
        let top_block = inode.addr[DOUBLE_INDIRECT_SLOT];
        let top = codec::decode_index(&read_index(dev, top_block)?);
        for &second in top.iter().filter(|&&b| b != 0) {
            free_block(dev, sb, second)?;
        }
        free_block(dev, sb, top_block)?;
    }

    inode.addr = Default::default();
    inode.size = 0;
    inode.store(dev, sb, ino)?;
    sb.store(dev)?;

    debug!("extent: inode {} imploded, {} data blocks released", ino, blocks);
    Ok(())
}

/// Implode inode `ino` and return it to the free inode pool
pub fn remove_inode<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, ino: InodeNo) -> Result<()> {
    implode(dev, sb, ino)?;
    free_inode(dev, sb, ino)?;
    sb.store(dev)
}

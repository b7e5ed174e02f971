//! Image geometry and block address translation
//!
//! A file's blocks are addressed by rank (0-based position in the byte
//! stream). Ranks 0..18 live in the inode's direct slots, ranks 18..274 in
//! the single-indirect index at slot 18, and ranks 274..=65809 in the
//! two-level tree rooted at slot 19.

use log::trace;

use crate::blockdev::{Block, BlockDevice, BLOCK_SIZE};
use crate::codec;
use crate::error::{FsError, Result};
use crate::format::{
    BlockNo, Inode, InodeNo, Superblock, DIRECT_BLOCKS, DOUBLE_INDIRECT_SLOT,
    DOUBLE_INDIRECT_START, INODES_PER_BLOCK, INODE_SIZE, MAX_FILE_BLOCKS, POINTERS_PER_BLOCK,
    SINGLE_INDIRECT_SLOT,
};

/// Block numbers for important filesystem structures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Block number of the boot block (always 0)
    pub boot: u64,
    /// Block number of the superblock (always 1)
    pub superblock: u64,
    /// First reserved block
    pub reserved: u64,
    /// Number of reserved blocks
    pub reserved_blocks: u64,
    /// First inode block
    pub inode_table: u64,
    /// Number of inode blocks
    pub inode_table_blocks: u64,
    /// First data block
    pub data_blocks: u64,
    /// Number of data blocks
    pub data_blocks_count: u64,
}

impl Layout {
    /// Geometry described by a superblock
    pub fn new(sb: &Superblock) -> Self {
        let inode_table = sb.first_inode_block as u64;
        let data_blocks = sb.data_start() as u64;
        Self {
            boot: 0,
            superblock: 1,
            reserved: 2,
            reserved_blocks: inode_table.saturating_sub(2),
            inode_table,
            inode_table_blocks: sb.inode_blocks as u64,
            data_blocks,
            data_blocks_count: (sb.total_blocks as u64).saturating_sub(data_blocks),
        }
    }

    /// Block number and byte offset of an inode record
    pub fn inode_block(&self, ino: InodeNo) -> (u64, usize) {
        let ino = ino as usize;
        (
            self.inode_table + (ino / INODES_PER_BLOCK) as u64,
            (ino % INODES_PER_BLOCK) * INODE_SIZE,
        )
    }
}

/// Where a rank's block number is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTier {
    /// Inode address slot
    Direct(usize),
    /// Entry of the single-indirect index
    Single(usize),
    /// Entry `entry` of the second-level index found at entry `group` of the top index
    Double { group: usize, entry: usize },
}

impl BlockTier {
    /// Classify a rank; ranks past the double-indirect range are `OutOfRange`
    pub fn of_rank(rank: u32) -> Result<Self> {
        let r = rank as usize;
        if r < DIRECT_BLOCKS {
            Ok(BlockTier::Direct(r))
        } else if rank < DOUBLE_INDIRECT_START {
            Ok(BlockTier::Single(r - DIRECT_BLOCKS))
        } else if rank < MAX_FILE_BLOCKS {
            let off = (rank - DOUBLE_INDIRECT_START) as usize;
            Ok(BlockTier::Double {
                group: off / POINTERS_PER_BLOCK,
                entry: off % POINTERS_PER_BLOCK,
            })
        } else {
            Err(FsError::OutOfRange(rank))
        }
    }
}

/// Read an index block; block 0 never holds one
pub fn read_index<D: BlockDevice + ?Sized>(dev: &mut D, block: BlockNo) -> Result<Block> {
    if block == 0 {
        return Err(FsError::Corrupt("missing index block".into()));
    }
    let mut buf = [0u8; BLOCK_SIZE];
    dev.read_block(block as u64, &mut buf)?;
    Ok(buf)
}

/// Write an index block back
pub fn write_index<D: BlockDevice + ?Sized>(dev: &mut D, block: BlockNo, data: &Block) -> Result<()> {
    if block == 0 {
        return Err(FsError::Corrupt("missing index block".into()));
    }
    dev.write_block(block as u64, data)?;
    Ok(())
}

/// Physical block holding rank `rank` of the file
pub fn translate_read<D: BlockDevice + ?Sized>(dev: &mut D, inode: &Inode, rank: u32) -> Result<BlockNo> {
    let block = match BlockTier::of_rank(rank)? {
        BlockTier::Direct(slot) => inode.addr[slot],
        BlockTier::Single(entry) => {
            let index = read_index(dev, inode.addr[SINGLE_INDIRECT_SLOT])?;
            codec::index_entry(&index, entry)
        }
        BlockTier::Double { group, entry } => {
            let top = read_index(dev, inode.addr[DOUBLE_INDIRECT_SLOT])?;
            let second = read_index(dev, codec::index_entry(&top, group))?;
            codec::index_entry(&second, entry)
        }
    };
    trace!("translate: rank {} -> block {}", rank, block);
    Ok(block)
}

/// Record `block` as rank `rank` of the file
///
/// Direct ranks only update `inode`; the caller stores it. Indirect ranks
/// rewrite the index block in place, which must already exist.
pub fn translate_write<D: BlockDevice + ?Sized>(
    dev: &mut D,
    inode: &mut Inode,
    rank: u32,
    block: BlockNo,
) -> Result<()> {
    match BlockTier::of_rank(rank)? {
        BlockTier::Direct(slot) => inode.addr[slot] = block,
        BlockTier::Single(entry) => {
            let index_block = inode.addr[SINGLE_INDIRECT_SLOT];
            let mut index = read_index(dev, index_block)?;
            codec::set_index_entry(&mut index, entry, block);
            write_index(dev, index_block, &index)?;
        }
        BlockTier::Double { group, entry } => {
            let top = read_index(dev, inode.addr[DOUBLE_INDIRECT_SLOT])?;
            let second_block = codec::index_entry(&top, group);
            let mut second = read_index(dev, second_block)?;
            codec::set_index_entry(&mut second, entry, block);
            write_index(dev, second_block, &second)?;
        }
    }
    trace!("translate: rank {} <- block {}", rank, block);
    Ok(())
}

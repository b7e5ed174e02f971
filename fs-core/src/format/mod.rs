//! UZIX on-disk format implementation

mod dirent;
mod inode;
mod mkfs;
mod time;

use std::fmt;
use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::blockdev::{Block, BlockDevice, BLOCK_SIZE};
use crate::codec;
use crate::error::Result;

pub use self::dirent::DirEntry;
pub use self::inode::{mode, permissions_string, Inode};
pub use self::mkfs::{mkfs, BOOT_TEMPLATE};
pub use self::time::Timestamp;

/// Physical block number
pub type BlockNo = u16;
/// Inode number
pub type InodeNo = u16;

/// Superblock signature
pub const SIGNATURE: u16 = 19638;
/// Block holding the superblock
pub const SUPERBLOCK_BLOCK: u64 = 1;
/// Inode number of the root directory
pub const ROOT_INODE: InodeNo = 1;
/// Size of an on-disk inode in bytes
pub const INODE_SIZE: usize = 64;
/// Inodes stored in each inode block
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// Slots in the free-block and free-inode caches
pub const CACHE_SLOTS: usize = 50;
/// Address slots in an inode
pub const ADDR_SLOTS: usize = 20;
/// Direct address slots
pub const DIRECT_BLOCKS: usize = 18;
/// Slot holding the single-indirect index block
pub const SINGLE_INDIRECT_SLOT: usize = 18;
/// Slot holding the top double-indirect index block
pub const DOUBLE_INDIRECT_SLOT: usize = 19;
/// Block numbers per index block
pub const POINTERS_PER_BLOCK: usize = codec::INDEX_ENTRIES;
/// First rank served by the double-indirect tree
pub const DOUBLE_INDIRECT_START: u32 = (DIRECT_BLOCKS + POINTERS_PER_BLOCK) as u32;
/// Number of addressable blocks per file
pub const MAX_FILE_BLOCKS: u32 =
    DOUBLE_INDIRECT_START + (POINTERS_PER_BLOCK * POINTERS_PER_BLOCK) as u32;
/// Size of a directory entry
pub const DIRENT_SIZE: usize = 16;
/// Size of the name field of a directory entry
pub const NAME_LEN: usize = 14;
/// Longest name the namespace operations will store
pub const MAX_NAME: usize = 13;
/// Highest link count an inode may reach
pub const LINK_MAX: u16 = 30000;

/// Number of blocks needed to hold `length` bytes
pub fn fit_bytes(length: i32) -> u32 {
    let length = length.max(0) as u32;
    (length + BLOCK_SIZE as u32 - 1) / BLOCK_SIZE as u32
}

/// A 50-slot stack of free block or inode numbers
///
/// The same layout (count, then 50 entries) is used inside the superblock
/// and for the free-list pages chained through free data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeCache {
    /// Number of live entries, as stored on disk
    pub count: u16,
    /// Entry storage; only the first `count` are meaningful
    pub entries: [u16; CACHE_SLOTS],
}

impl Default for FreeCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeCache {
    /// Size of a cache on disk
    pub const SIZE: usize = 2 + 2 * CACHE_SLOTS;

    /// An empty cache
    pub const fn new() -> Self {
        Self {
            count: 0,
            entries: [0; CACHE_SLOTS],
        }
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Whether no entries are cached
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether all 50 slots are used
    pub fn is_full(&self) -> bool {
        self.len() >= CACHE_SLOTS
    }

    /// Whether the stored count can be trusted
    pub fn is_sane(&self) -> bool {
        self.len() <= CACHE_SLOTS
    }

    /// Live entries, bottom of the stack first
    pub fn entries(&self) -> &[u16] {
        &self.entries[..self.len().min(CACHE_SLOTS)]
    }

    /// Push a number; returns false when the cache is full
    pub fn push(&mut self, value: u16) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries[self.len()] = value;
        self.count += 1;
        true
    }

    /// Pop the most recently pushed number
    ///
    /// Returns `None` when the cache is empty or its count is out of range.
    pub fn pop(&mut self) -> Option<u16> {
        if self.is_empty() || !self.is_sane() {
            return None;
        }
        self.count -= 1;
        Some(self.entries[self.len()])
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.count = 0;
        self.entries = [0; CACHE_SLOTS];
    }

    /// Read a cache (count, then 50 entries)
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let count = reader.read_u16::<LittleEndian>()?;
        let mut entries = [0u16; CACHE_SLOTS];
        codec::read_u16s(reader, &mut entries)?;
        Ok(Self { count, entries })
    }

    /// Write a cache (count, then 50 entries)
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.count)?;
        codec::write_u16s(writer, &self.entries)
    }

    /// Decode a free-list page
    pub fn from_page(block: &Block) -> io::Result<Self> {
        Self::read_from(&mut Cursor::new(&block[..]))
    }

    /// Encode as a free-list page; the rest of the block is zero
    pub fn to_page(&self) -> io::Result<Block> {
        let mut block = [0u8; BLOCK_SIZE];
        self.write_to(&mut Cursor::new(&mut block[..]))?;
        Ok(block)
    }
}

/// A superblock consistency failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    BadSignature(u16),
    InodeBlockPointer,
    TooManyInodeBlocks,
    ImpossibleFreeBlockCount,
    FreeBlockCacheCorrupt,
    TooManyFreeInodes,
    FreeInodeCacheCorrupt,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::BadSignature(sig) => {
                write!(f, "bad signature ({}, expected {})", sig, SIGNATURE)
            }
            Violation::InodeBlockPointer => write!(f, "pointer to inode block is out of range"),
            Violation::TooManyInodeBlocks => {
                write!(f, "there are more inode blocks than blocks in the disk")
            }
            Violation::ImpossibleFreeBlockCount => write!(f, "number of free blocks is impossible"),
            Violation::FreeBlockCacheCorrupt => write!(f, "free block list is corrupt"),
            Violation::TooManyFreeInodes => {
                write!(f, "there are more free inodes than blocks to hold them")
            }
            Violation::FreeInodeCacheCorrupt => write!(f, "free inode cache list is corrupt"),
        }
    }
}

/// Superblock stored in block 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    /// Signature, 19638 on valid images
    pub signature: u16,
    /// Block number of inode block 0
    pub first_inode_block: u16,
    /// Number of inode blocks
    pub inode_blocks: u16,
    /// Number of blocks in the filesystem
    pub total_blocks: u16,
    /// Free data blocks
    pub free_blocks: u16,
    /// Free-block cache
    pub free_cache: FreeCache,
    /// Free inodes
    pub free_inodes: u16,
    /// Free-inode cache
    pub inode_cache: FreeCache,
    /// Last modification time
    pub time: Timestamp,
}

impl Superblock {
    /// Size of the superblock on disk
    pub const SIZE: usize = 8 + 2 + FreeCache::SIZE + 2 + FreeCache::SIZE + Timestamp::SIZE;

    /// Number of checks performed by [`Superblock::validate`]
    pub const CHECKS: usize = 7;

    /// Read the superblock fields
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let signature = reader.read_u16::<LittleEndian>()?;
        let first_inode_block = reader.read_u16::<LittleEndian>()?;
        let inode_blocks = reader.read_u16::<LittleEndian>()?;
        let total_blocks = reader.read_u16::<LittleEndian>()?;
        let free_blocks = reader.read_u16::<LittleEndian>()?;
        let free_cache = FreeCache::read_from(reader)?;
        let free_inodes = reader.read_u16::<LittleEndian>()?;
        let inode_cache = FreeCache::read_from(reader)?;
        let time = Timestamp::read_from(reader)?;

        Ok(Self {
            signature,
            first_inode_block,
            inode_blocks,
            total_blocks,
            free_blocks,
            free_cache,
            free_inodes,
            inode_cache,
            time,
        })
    }

    /// Write the superblock fields
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.signature)?;
        writer.write_u16::<LittleEndian>(self.first_inode_block)?;
        writer.write_u16::<LittleEndian>(self.inode_blocks)?;
        writer.write_u16::<LittleEndian>(self.total_blocks)?;
        writer.write_u16::<LittleEndian>(self.free_blocks)?;
        self.free_cache.write_to(writer)?;
        writer.write_u16::<LittleEndian>(self.free_inodes)?;
        self.inode_cache.write_to(writer)?;
        self.time.write_to(writer)?;
        Ok(())
    }

    /// Load the superblock from block 1
    pub fn load<D: BlockDevice + ?Sized>(dev: &mut D) -> Result<Self> {
        let mut block = [0u8; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_BLOCK, &mut block)?;
        Ok(Self::read_from(&mut Cursor::new(&block[..]))?)
    }

    /// Store the superblock into block 1, keeping the bytes past its end
    pub fn store<D: BlockDevice + ?Sized>(&self, dev: &mut D) -> Result<()> {
        let mut block = [0u8; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_BLOCK, &mut block)?;
        self.write_to(&mut Cursor::new(&mut block[..]))?;
        dev.write_block(SUPERBLOCK_BLOCK, &block)?;
        Ok(())
    }

    /// Number of inode records in the inode area
    pub fn inode_capacity(&self) -> u32 {
        self.inode_blocks as u32 * INODES_PER_BLOCK as u32
    }

    /// First block after the inode area
    pub fn data_start(&self) -> u32 {
        self.first_inode_block as u32 + self.inode_blocks as u32
    }

    /// Whether `block` lies in the data area
    pub fn is_data_block(&self, block: BlockNo) -> bool {
        let block = block as u32;
        block >= self.data_start() && block < self.total_blocks as u32
    }

    /// Run the seven consistency checks; an empty list means a sane superblock
    pub fn validate(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        if self.signature != SIGNATURE {
            violations.push(Violation::BadSignature(self.signature));
        }
        if self.first_inode_block <= 1 || self.first_inode_block > self.total_blocks {
            violations.push(Violation::InodeBlockPointer);
        }
        if self.inode_blocks >= self.total_blocks {
            violations.push(Violation::TooManyInodeBlocks);
        }
        if self.free_blocks > self.total_blocks {
            violations.push(Violation::ImpossibleFreeBlockCount);
        }
        if self.free_cache.count == 0 || !self.free_cache.is_sane() {
            violations.push(Violation::FreeBlockCacheCorrupt);
        }
        if self.free_inodes as u32 > self.inode_capacity() {
            violations.push(Violation::TooManyFreeInodes);
        }
        if self.inode_cache.count > self.free_inodes {
            violations.push(Violation::FreeInodeCacheCorrupt);
        }

        violations
    }
}

//! Creation of fresh UZIX images

use std::io::Cursor;

use log::{debug, info};

use super::{
    mode, DirEntry, FreeCache, Inode, Superblock, Timestamp, INODES_PER_BLOCK, ROOT_INODE,
    SIGNATURE,
};
use crate::blockdev::{Block, BlockDevice, BLOCK_SIZE};
use crate::config::FormatConfig;
use crate::error::{FsError, Result};

/// Boot loader header and code; the block is zero past these bytes
#[rustfmt::skip]
const BOOT_CODE: [u8; 0x4A] = [
    0xEB, 0xFE, 0x90, 0x55, 0x5A, 0x49, 0x58, 0x64,
    0x69, 0x73, 0x6B, 0x00, 0x02, 0x02, 0x01, 0x00,
    0x00, 0x00, 0x00, 0xA0, 0x05, 0xF9, 0x00, 0x00,
    0x09, 0x00, 0x02, 0x00, 0x00, 0x00, 0xD0, 0x36,
    0x56, 0x23, 0x36, 0xC0, 0x31, 0x1F, 0xF5, 0x11,
    0x4A, 0xC0, 0x0E, 0x09, 0xCD, 0x7D, 0xF3, 0x0E,
    0x08, 0xCD, 0x7D, 0xF3, 0xFE, 0x1B, 0xCA, 0x22,
    0x40, 0xF3, 0xDB, 0xA8, 0xE6, 0xFC, 0xD3, 0xA8,
    0x3A, 0xFF, 0xFF, 0x2F, 0xE6, 0xFC, 0x32, 0xFF,
    0xFF, 0xC7,
];

/// `$`-terminated message printed when the disk is booted under MSX-DOS
const BOOT_MESSAGE: &[u8] = b"WARNING!\x07\r\n\nThis is an UZIX disk, non bootable.\r\n\
Using it under MSXDOS can damage it.\r\n\nHit ESC for BASIC or any key to reboot.$";

/// Offset of the reserved-block count inside the boot block
pub const BOOT_RESERVED_OFFSET: usize = 0x10;

const fn build_boot_template() -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    let mut i = 0;
    while i < BOOT_CODE.len() {
        block[i] = BOOT_CODE[i];
        i += 1;
    }
    let mut j = 0;
    while j < BOOT_MESSAGE.len() {
        block[BOOT_CODE.len() + j] = BOOT_MESSAGE[j];
        j += 1;
    }
    block
}

/// MSX-DOS style boot block written to block 0
pub const BOOT_TEMPLATE: Block = build_boot_template();

/// Build a fresh filesystem on `dev` and return its superblock
///
/// The whole image is zeroed first. Data blocks after the root directory
/// block are threaded into the free list from the last block downwards, so
/// the lowest block numbers are handed out first.
pub fn mkfs<D: BlockDevice + ?Sized>(dev: &mut D, config: &FormatConfig) -> Result<Superblock> {
    config
        .validate()
        .map_err(|e| FsError::InvalidArgument(e.to_string()))?;

    let total = config.total_blocks();
    if total > dev.block_count() {
        return Err(FsError::InvalidArgument(format!(
            "device holds {} blocks, {} requested",
            dev.block_count(),
            total
        )));
    }
    let inode_blocks = config.inode_blocks() as u16;
    let reserved = config.reserved_blocks() as u16;
    let total = total as u16;

    info!(
        "mkfs: {} blocks ({} for inodes, {} reserved, {} data)",
        total,
        inode_blocks,
        reserved,
        config.data_blocks()
    );

    let zero = [0u8; BLOCK_SIZE];
    for block_num in 0..total as u64 {
        dev.write_block(block_num, &zero)?;
    }

    let mut boot = BOOT_TEMPLATE;
    boot[BOOT_RESERVED_OFFSET] = reserved as u8;
    dev.write_block(0, &boot)?;

    let mut sb = Superblock {
        signature: SIGNATURE,
        first_inode_block: reserved + 2,
        inode_blocks,
        total_blocks: total,
        free_blocks: 0,
        free_cache: FreeCache::new(),
        free_inodes: inode_blocks * INODES_PER_BLOCK as u16 - 2,
        inode_cache: FreeCache::new(),
        time: Timestamp::default(),
    };

    // The root directory takes the first data block
    let root_block = sb.data_start() as u16;

    // A zero at the bottom of the chain marks the end of the free list
    sb.free_cache.push(0);
    let mut pages = 0;
    let mut block_num = total - 1;
    while block_num > root_block {
        if sb.free_cache.is_full() {
            dev.write_block(block_num as u64, &sb.free_cache.to_page()?)?;
            sb.free_cache.clear();
            pages += 1;
        }
        sb.free_cache.push(block_num);
        sb.free_blocks += 1;
        block_num -= 1;
    }
    debug!(
        "mkfs: {} free blocks, {} free-list pages, {} cached",
        sb.free_blocks,
        pages,
        sb.free_cache.len()
    );

    let now = Timestamp::now();

    let mut root = Inode::new(mode::IFDIR | 0o755, 2, now);
    root.size = (2 * DirEntry::SIZE) as i32;
    root.addr[0] = root_block;
    root.store(dev, &sb, ROOT_INODE)?;

    let mut dir_block = [0u8; BLOCK_SIZE];
    {
        let mut cursor = Cursor::new(&mut dir_block[..]);
        DirEntry::new(ROOT_INODE, b".").write_to(&mut cursor)?;
        DirEntry::new(ROOT_INODE, b"..").write_to(&mut cursor)?;
    }
    dev.write_block(root_block as u64, &dir_block)?;

    let reserved_inode = Inode {
        mode: 0xFFFF,
        nlink: 1,
        ..Default::default()
    };
    reserved_inode.store(dev, &sb, 0)?;

    for ino in (ROOT_INODE + 1)..INODES_PER_BLOCK as u16 {
        sb.inode_cache.push(ino);
    }

    sb.time = now;
    sb.store(dev)?;
    dev.sync()?;

    info!("mkfs: root directory at block {}", root_block);
    Ok(sb)
}

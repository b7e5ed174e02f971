//! Block device trait definitions for UZIX images

use std::io;
use thiserror::Error;

/// Block size in bytes
pub const BLOCK_SIZE: usize = 512;

/// A raw device block
pub type Block = [u8; BLOCK_SIZE];

/// Error type for block device operations
#[derive(Error, Debug)]
pub enum BlockDeviceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid block number: {0}")]
    InvalidBlockNumber(u64),
    #[error("Device is read-only")]
    ReadOnly,
}

/// Result type for block device operations
pub type Result<T> = std::result::Result<T, BlockDeviceError>;

/// Trait for block device operations
///
/// Every call goes straight to the underlying handle; implementations do not
/// cache blocks.
pub trait BlockDevice {
    /// Read a block from the device
    fn read_block(&mut self, block_num: u64, buf: &mut Block) -> Result<()>;

    /// Write a block to the device
    fn write_block(&mut self, block_num: u64, data: &Block) -> Result<()>;

    /// Get the total number of blocks in the device
    fn block_count(&self) -> u64;

    /// Get the block size in bytes
    fn block_size(&self) -> usize {
        BLOCK_SIZE
    }

    /// Sync any pending writes to the device
    fn sync(&mut self) -> Result<()>;

    /// Check if the device is read-only
    fn is_read_only(&self) -> bool {
        false
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_block(&mut self, block_num: u64, buf: &mut Block) -> Result<()> {
        (**self).read_block(block_num, buf)
    }

    fn write_block(&mut self, block_num: u64, data: &Block) -> Result<()> {
        (**self).write_block(block_num, data)
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read_block(&mut self, block_num: u64, buf: &mut Block) -> Result<()> {
        (**self).read_block(block_num, buf)
    }

    fn write_block(&mut self, block_num: u64, data: &Block) -> Result<()> {
        (**self).write_block(block_num, data)
    }

    fn block_count(&self) -> u64 {
        (**self).block_count()
    }

    fn sync(&mut self) -> Result<()> {
        (**self).sync()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }
}

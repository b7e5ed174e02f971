//! Raw block I/O for UZIX images

mod blockdev_trait;

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

// Re-export the block device trait and related types
pub use self::blockdev_trait::{Block, BlockDevice, BlockDeviceError, Result, BLOCK_SIZE};

/// A block device backed by any seekable handle, usually an image file
#[derive(Debug)]
pub struct FileBackedBlockDevice<F = File> {
    handle: F,
    size: u64,
    block_count: u64,
    read_only: bool,
}

/// An image held entirely in memory
pub type MemoryBlockDevice = FileBackedBlockDevice<Cursor<Vec<u8>>>;

impl FileBackedBlockDevice<File> {
    /// Create a new image file of `size` bytes, truncating any existing file
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;

        // Set file length
        file.set_len(size)?;

        Ok(Self {
            handle: file,
            size,
            block_count: size / BLOCK_SIZE as u64,
            read_only: false,
        })
    }

    /// Open an existing image file
    pub fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path.as_ref())?;

        Self::from_handle(file, read_only)
    }
}

impl MemoryBlockDevice {
    /// Create a zero-filled in-memory image of `blocks` blocks
    pub fn in_memory(blocks: u64) -> Self {
        let size = blocks * BLOCK_SIZE as u64;
        Self {
            handle: Cursor::new(vec![0u8; size as usize]),
            size,
            block_count: blocks,
            read_only: false,
        }
    }

    /// Borrow the raw image bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.handle.get_ref()
    }
}

impl<F: Read + Write + Seek> FileBackedBlockDevice<F> {
    /// Wrap an already opened handle; its current length fixes the block count
    pub fn from_handle(mut handle: F, read_only: bool) -> Result<Self> {
        let size = handle.seek(SeekFrom::End(0))?;
        handle.seek(SeekFrom::Start(0))?;

        Ok(Self {
            handle,
            size,
            block_count: size / BLOCK_SIZE as u64,
            read_only,
        })
    }

    /// Get the total size of the device in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Give back the underlying handle
    pub fn into_inner(self) -> F {
        self.handle
    }

    fn seek_to(&mut self, block_num: u64) -> Result<()> {
        if block_num >= self.block_count {
            return Err(BlockDeviceError::InvalidBlockNumber(block_num));
        }
        let offset = block_num * BLOCK_SIZE as u64;
        self.handle.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}

impl<F: Read + Write + Seek> BlockDevice for FileBackedBlockDevice<F> {
    fn read_block(&mut self, block_num: u64, buf: &mut Block) -> Result<()> {
        self.seek_to(block_num)?;
        self.handle.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, block_num: u64, data: &Block) -> Result<()> {
        if self.read_only {
            return Err(BlockDeviceError::ReadOnly);
        }

        self.seek_to(block_num)?;
        self.handle.write_all(data)?;
        Ok(())
    }

    fn block_count(&self) -> u64 {
        self.block_count
    }

    fn sync(&mut self) -> Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.handle.flush()?;
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_block_device_operations() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test_device.dsk");

        let mut device = FileBackedBlockDevice::create(&file_path, 512 * 8).unwrap();
        assert_eq!(device.block_count(), 8);

        let test_data = [0xAAu8; BLOCK_SIZE];
        device.write_block(0, &test_data).unwrap();

        let mut read_buf = [0u8; BLOCK_SIZE];
        device.read_block(0, &mut read_buf).unwrap();
        assert_eq!(test_data, read_buf);

        for i in 1..8 {
            let data = [i as u8; BLOCK_SIZE];
            device.write_block(i, &data).unwrap();

            let mut read_data = [0u8; BLOCK_SIZE];
            device.read_block(i, &mut read_data).unwrap();
            assert_eq!(data, read_data);
        }
    }

    #[test]
    fn test_read_only() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test_read_only.dsk");

        let mut device = FileBackedBlockDevice::create(&file_path, 512).unwrap();
        let test_data = [0x55u8; BLOCK_SIZE];
        device.write_block(0, &test_data).unwrap();
        device.sync().unwrap();
        drop(device);

        let mut read_only_device = FileBackedBlockDevice::open(&file_path, true).unwrap();
        let mut read_buf = [0u8; BLOCK_SIZE];
        read_only_device.read_block(0, &mut read_buf).unwrap();
        assert_eq!(test_data, read_buf);

        let write_result = read_only_device.write_block(0, &[0u8; BLOCK_SIZE]);
        assert!(matches!(write_result, Err(BlockDeviceError::ReadOnly)));
    }

    #[test]
    fn test_block_number_past_end_is_rejected() {
        let mut device = MemoryBlockDevice::in_memory(4);
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            device.read_block(4, &mut buf),
            Err(BlockDeviceError::InvalidBlockNumber(4))
        ));
    }

    #[test]
    fn test_partial_trailing_block_is_not_addressable() {
        // 1000 bytes hold one full block and a fragment
        let mut device =
            FileBackedBlockDevice::from_handle(Cursor::new(vec![7u8; 1000]), false).unwrap();
        assert_eq!(device.block_count(), 1);
        assert_eq!(device.size(), 1000);

        let mut buf = [0u8; BLOCK_SIZE];
        device.read_block(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 7));
        assert!(device.read_block(1, &mut buf).is_err());
    }

    #[test]
    fn test_memory_device_writes_land_at_block_offsets() {
        let mut device = MemoryBlockDevice::in_memory(3);
        device.write_block(2, &[0x11; BLOCK_SIZE]).unwrap();
        let bytes = device.as_bytes();
        assert!(bytes[..1024].iter().all(|&b| b == 0));
        assert!(bytes[1024..].iter().all(|&b| b == 0x11));
    }
}

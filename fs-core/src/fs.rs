//! Filesystem session
//!
//! [`DiskFs`] owns a block device and the in-memory superblock. Every
//! mutating call takes `&mut self` and writes its changes through to the
//! device before returning.

use log::{debug, info, warn};

use crate::block_alloc;
use crate::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::config::FormatConfig;
use crate::dir::{self, DirIter, Stat};
use crate::error::{FsError, Result};
use crate::extent;
use crate::format::{
    mkfs, BlockNo, DirEntry, Inode, InodeNo, Superblock, Timestamp, Violation, SIGNATURE,
};
use crate::inode_alloc;
use crate::layout;
use crate::namespace;

/// An open UZIX filesystem
#[derive(Debug)]
pub struct DiskFs<D: BlockDevice> {
    dev: D,
    sb: Superblock,
}

impl<D: BlockDevice> DiskFs<D> {
    /// Open the filesystem on `dev`
    ///
    /// A wrong signature is fatal. Other superblock inconsistencies are
    /// logged and left for [`DiskFs::validate`] to report.
    pub fn open(mut dev: D) -> Result<Self> {
        let sb = Superblock::load(&mut dev)?;
        if sb.signature != SIGNATURE {
            return Err(FsError::BadSignature(sb.signature));
        }
        for violation in sb.validate() {
            warn!("superblock check failed: {}", violation);
        }
        info!(
            "opened filesystem: {} blocks, {} free, {} inodes free",
            sb.total_blocks, sb.free_blocks, sb.free_inodes
        );
        Ok(Self { dev, sb })
    }

    /// Build a fresh filesystem on `dev` and open it
    pub fn format(mut dev: D, config: &FormatConfig) -> Result<Self> {
        let sb = mkfs(&mut dev, config)?;
        Ok(Self { dev, sb })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.sb
    }

    pub fn device(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Run the superblock consistency checks
    pub fn validate(&self) -> Vec<Violation> {
        self.sb.validate()
    }

    /// Stamp the superblock and flush the device
    pub fn sync(&mut self) -> Result<()> {
        self.sb.time = Timestamp::now();
        self.sb.store(&mut self.dev)?;
        self.dev.sync()?;
        Ok(())
    }

    /// Give the device back
    pub fn into_device(self) -> D {
        self.dev
    }

    pub fn read_inode(&mut self, ino: InodeNo) -> Result<Inode> {
        Inode::load(&mut self.dev, &self.sb, ino)
    }

    pub fn write_inode(&mut self, ino: InodeNo, inode: &Inode) -> Result<()> {
        inode.store(&mut self.dev, &self.sb, ino)
    }

    pub fn alloc_block(&mut self) -> Result<BlockNo> {
        block_alloc::alloc_block(&mut self.dev, &mut self.sb)
    }

    pub fn free_block(&mut self, block: BlockNo) -> Result<()> {
        block_alloc::free_block(&mut self.dev, &mut self.sb, block)
    }

    pub fn alloc_inode(&mut self) -> Result<InodeNo> {
        inode_alloc::alloc_inode(&mut self.dev, &mut self.sb)
    }

    pub fn free_inode(&mut self, ino: InodeNo) -> Result<()> {
        inode_alloc::free_inode(&mut self.dev, &mut self.sb, ino)
    }

    pub fn translate_read(&mut self, inode: &Inode, rank: u32) -> Result<BlockNo> {
        layout::translate_read(&mut self.dev, inode, rank)
    }

    pub fn translate_write(&mut self, inode: &mut Inode, rank: u32, block: BlockNo) -> Result<()> {
        layout::translate_write(&mut self.dev, inode, rank, block)
    }

    pub fn grow(&mut self, ino: InodeNo, new_len: i32) -> Result<()> {
        extent::grow(&mut self.dev, &mut self.sb, ino, new_len)
    }

    pub fn implode(&mut self, ino: InodeNo) -> Result<()> {
        extent::implode(&mut self.dev, &mut self.sb, ino)
    }

    pub fn remove_inode(&mut self, ino: InodeNo) -> Result<()> {
        extent::remove_inode(&mut self.dev, &mut self.sb, ino)
    }

    pub fn open_dir(&mut self, ino: InodeNo) -> Result<DirIter<'_, D>> {
        dir::open_dir(&mut self.dev, &self.sb, ino)
    }

    pub fn read_dir(&mut self, ino: InodeNo) -> Result<Vec<DirEntry>> {
        dir::read_dir(&mut self.dev, &self.sb, ino)
    }

    pub fn lookup(&mut self, dir: InodeNo, name: &[u8]) -> Result<InodeNo> {
        dir::lookup(&mut self.dev, &self.sb, dir, name)
    }

    pub fn resolve(&mut self, path: &str) -> Result<InodeNo> {
        dir::resolve(&mut self.dev, &self.sb, path)
    }

    pub fn stat(&mut self, ino: InodeNo) -> Result<Stat> {
        dir::stat(&mut self.dev, &self.sb, ino)
    }

    pub fn create(&mut self, dir: InodeNo, name: &[u8], mode: u16) -> Result<InodeNo> {
        namespace::create(&mut self.dev, &mut self.sb, dir, name, mode)
    }

    pub fn mkdir(&mut self, parent: InodeNo, name: &[u8], perm: u16) -> Result<InodeNo> {
        namespace::mkdir(&mut self.dev, &mut self.sb, parent, name, perm)
    }

    pub fn link(&mut self, dir: InodeNo, name: &[u8], target: InodeNo) -> Result<()> {
        namespace::link(&mut self.dev, &mut self.sb, dir, name, target)
    }

    pub fn unlink(&mut self, dir: InodeNo, name: &[u8]) -> Result<()> {
        namespace::unlink(&mut self.dev, &mut self.sb, dir, name)
    }

    pub fn rmdir(&mut self, parent: InodeNo, name: &[u8]) -> Result<()> {
        namespace::rmdir(&mut self.dev, &mut self.sb, parent, name)
    }

    pub fn add_entry(&mut self, dir: InodeNo, name: &[u8], ino: InodeNo) -> Result<()> {
        namespace::add_entry(&mut self.dev, &mut self.sb, dir, name, ino)
    }

    pub fn remove_entry(&mut self, dir: InodeNo, name: &[u8]) -> Result<DirEntry> {
        namespace::remove_entry(&mut self.dev, &self.sb, dir, name)
    }

    /// Read file bytes starting at `offset`
    ///
    /// Stops at the file size; returns the number of bytes copied.
    pub fn read_data(&mut self, ino: InodeNo, offset: u32, buf: &mut [u8]) -> Result<usize> {
        let inode = self.read_inode(ino)?;
        let size = inode.size.max(0) as u64;
        let start = offset as u64;
        if start >= size || buf.is_empty() {
            return Ok(0);
        }
        let end = size.min(start + buf.len() as u64);

        let mut block = [0u8; BLOCK_SIZE];
        let mut pos = start;
        while pos < end {
            let rank = (pos / BLOCK_SIZE as u64) as u32;
            let within = (pos % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - within).min((end - pos) as usize);

            let block_no = self.data_block(&inode, ino, rank)?;
            self.dev.read_block(block_no as u64, &mut block)?;
            let at = (pos - start) as usize;
            buf[at..at + chunk].copy_from_slice(&block[within..within + chunk]);
            pos += chunk as u64;
        }
        Ok((end - start) as usize)
    }

    /// Overwrite file bytes starting at `offset`
    ///
    /// Only the part inside the current size is written; grow the file
    /// first to write past its end. Returns the number of bytes written.
    pub fn write_data(&mut self, ino: InodeNo, offset: u32, data: &[u8]) -> Result<usize> {
        let mut inode = self.read_inode(ino)?;
        let size = inode.size.max(0) as u64;
        let start = offset as u64;
        if start >= size || data.is_empty() {
            return Ok(0);
        }
        let end = size.min(start + data.len() as u64);

        let mut block = [0u8; BLOCK_SIZE];
        let mut pos = start;
        while pos < end {
            let rank = (pos / BLOCK_SIZE as u64) as u32;
            let within = (pos % BLOCK_SIZE as u64) as usize;
            let chunk = (BLOCK_SIZE - within).min((end - pos) as usize);

            let block_no = self.data_block(&inode, ino, rank)?;
            if chunk < BLOCK_SIZE {
                self.dev.read_block(block_no as u64, &mut block)?;
            }
            let at = (pos - start) as usize;
            block[within..within + chunk].copy_from_slice(&data[at..at + chunk]);
            self.dev.write_block(block_no as u64, &block)?;
            pos += chunk as u64;
        }

        inode.mtime = Timestamp::now();
        self.write_inode(ino, &inode)?;
        Ok((end - start) as usize)
    }

    /// Write `data` at `offset`, growing the file as needed
    pub fn write_file(&mut self, ino: InodeNo, offset: u32, data: &[u8]) -> Result<usize> {
        let end = offset as u64 + data.len() as u64;
        if end > i32::MAX as u64 {
            return Err(FsError::InvalidArgument(format!("write end {} past the size field", end)));
        }
        let inode = self.read_inode(ino)?;
        if end > inode.size.max(0) as u64 {
            self.grow(ino, end as i32)?;
        }
        let written = self.write_data(ino, offset, data)?;
        debug!("wrote {} bytes at {} to inode {}", written, offset, ino);
        Ok(written)
    }

    /// The whole content of a file
    pub fn read_file(&mut self, ino: InodeNo) -> Result<Vec<u8>> {
        let size = self.read_inode(ino)?.size.max(0) as usize;
        let mut data = vec![0u8; size];
        let read = self.read_data(ino, 0, &mut data)?;
        data.truncate(read);
        Ok(data)
    }

    fn data_block(&mut self, inode: &Inode, ino: InodeNo, rank: u32) -> Result<BlockNo> {
        let block = layout::translate_read(&mut self.dev, inode, rank)?;
        if !self.sb.is_data_block(block) {
            return Err(FsError::Corrupt(format!(
                "inode {} rank {} maps to block {}",
                ino, rank, block
            )));
        }
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockdev::MemoryBlockDevice;
    use crate::config::SizeSpec;
    use crate::format::ROOT_INODE;

    fn small_fs() -> DiskFs<MemoryBlockDevice> {
        let config = FormatConfig {
            image_size: SizeSpec::from_blocks(720),
            ..Default::default()
        };
        DiskFs::format(MemoryBlockDevice::in_memory(720), &config).unwrap()
    }

    #[test]
    fn test_open_rejects_bad_signature() {
        let mut dev = MemoryBlockDevice::in_memory(16);
        dev.write_block(1, &[0x11; BLOCK_SIZE]).unwrap();
        assert!(matches!(DiskFs::open(dev), Err(FsError::BadSignature(0x1111))));
    }

    #[test]
    fn test_reopen_keeps_superblock() {
        let mut fs = small_fs();
        fs.sync().unwrap();
        let sb = fs.superblock().clone();
        let fs = DiskFs::open(fs.into_device()).unwrap();
        assert_eq!(fs.superblock(), &sb);
        assert!(fs.validate().is_empty());
    }

    #[test]
    fn test_write_and_read_file() {
        let mut fs = small_fs();
        let ino = fs.create(ROOT_INODE, b"notes", 0o644).unwrap();
        let data: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();

        assert_eq!(fs.write_file(ino, 0, &data).unwrap(), 1300);
        assert_eq!(fs.read_inode(ino).unwrap().size, 1300);
        assert_eq!(fs.read_file(ino).unwrap(), data);

        // overwrite across a block boundary
        assert_eq!(fs.write_data(ino, 510, b"XYZW").unwrap(), 4);
        let mut buf = [0u8; 6];
        assert_eq!(fs.read_data(ino, 509, &mut buf).unwrap(), 6);
        assert_eq!(&buf[1..5], b"XYZW");

        // writes and reads stop at the size
        assert_eq!(fs.write_data(ino, 1298, b"abcd").unwrap(), 2);
        let mut tail = [0u8; 10];
        assert_eq!(fs.read_data(ino, 1295, &mut tail).unwrap(), 5);
        assert_eq!(&tail[3..5], b"ab");
        assert_eq!(fs.read_data(ino, 1300, &mut tail).unwrap(), 0);
    }

    #[test]
    fn test_resolve_through_session() {
        let mut fs = small_fs();
        let dir = fs.mkdir(ROOT_INODE, b"etc", 0o755).unwrap();
        let file = fs.create(dir, b"motd", 0o644).unwrap();
        fs.write_file(file, 0, b"welcome\n").unwrap();

        assert_eq!(fs.resolve("/etc/motd").unwrap(), file);
        let st = fs.stat(file).unwrap();
        assert_eq!(st.size, 8);
        assert_eq!(st.nlink, 1);
        assert_eq!(fs.read_file(file).unwrap(), b"welcome\n");
    }
}

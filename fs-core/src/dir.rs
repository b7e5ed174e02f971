//! Directory traversal and path resolution
//!
//! A directory is a file of 16-byte entries. The live entries are the first
//! `size / 16`, cut short by the first entry whose inode number is 0.

use std::io::Cursor;

use log::trace;

use crate::blockdev::{Block, BlockDevice, BLOCK_SIZE};
use crate::error::{FsError, Result};
use crate::format::{DirEntry, Inode, InodeNo, Superblock, Timestamp, DIRENT_SIZE, ROOT_INODE};
use crate::layout::translate_read;

pub(crate) const ENTRIES_PER_BLOCK: u32 = (BLOCK_SIZE / DIRENT_SIZE) as u32;

/// Lazy iterator over the live entries of a directory
///
/// Each data block is read once through the address translator. A read
/// error is yielded once and ends the iteration.
pub struct DirIter<'a, D: BlockDevice + ?Sized> {
    dev: &'a mut D,
    dir: Inode,
    ino: InodeNo,
    limit: u32,
    next: u32,
    current: Option<(u32, Block)>,
}

impl<'a, D: BlockDevice + ?Sized> DirIter<'a, D> {
    /// Start iterating directory `ino`
    pub fn open(dev: &'a mut D, sb: &Superblock, ino: InodeNo) -> Result<Self> {
        let dir = Inode::load(dev, sb, ino)?;
        if !dir.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(Self {
            dev,
            dir,
            ino,
            limit: declared_entries(&dir),
            next: 0,
            current: None,
        })
    }

    /// Inode number of the directory
    pub fn ino(&self) -> InodeNo {
        self.ino
    }

    /// The directory's inode record as loaded when iteration began
    pub fn inode(&self) -> &Inode {
        &self.dir
    }

    /// Position of the next entry
    pub fn position(&self) -> u32 {
        self.next
    }

    /// Start again from the first entry
    pub fn rewind(&mut self) {
        self.next = 0;
    }

    fn entry_at(&mut self, index: u32) -> Result<DirEntry> {
        let rank = index / ENTRIES_PER_BLOCK;
        let cached = matches!(self.current, Some((r, _)) if r == rank);
        if !cached {
            let block_no = translate_read(&mut *self.dev, &self.dir, rank)?;
            let mut block = [0u8; BLOCK_SIZE];
            self.dev.read_block(block_no as u64, &mut block)?;
            self.current = Some((rank, block));
        }

        let offset = (index % ENTRIES_PER_BLOCK) as usize * DIRENT_SIZE;
        match &self.current {
            Some((_, block)) => Ok(DirEntry::read_from(&mut Cursor::new(
                &block[offset..offset + DIRENT_SIZE],
            ))?),
            None => Err(FsError::Corrupt(format!("directory {} block {} not loaded", self.ino, rank))),
        }
    }
}

impl<D: BlockDevice + ?Sized> Iterator for DirIter<'_, D> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.limit {
            return None;
        }
        match self.entry_at(self.next) {
            Ok(entry) if entry.inode == 0 => {
                trace!("dir {}: end marker at entry {}", self.ino, self.next);
                self.limit = self.next;
                None
            }
            Ok(entry) => {
                self.next += 1;
                Some(Ok(entry))
            }
            Err(e) => {
                self.limit = self.next;
                Some(Err(e))
            }
        }
    }
}

/// Entry slots the directory's size accounts for
pub fn declared_entries(dir: &Inode) -> u32 {
    dir.size.max(0) as u32 / DIRENT_SIZE as u32
}

/// Open directory `ino` for iteration
pub fn open_dir<'a, D: BlockDevice + ?Sized>(dev: &'a mut D, sb: &Superblock, ino: InodeNo) -> Result<DirIter<'a, D>> {
    DirIter::open(dev, sb, ino)
}

/// Collect the live entries of directory `ino`
pub fn read_dir<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, ino: InodeNo) -> Result<Vec<DirEntry>> {
    open_dir(dev, sb, ino)?.collect()
}

/// Find `name` in directory `dir`, returning its position and entry
pub fn find_entry<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &Superblock,
    dir: InodeNo,
    name: &[u8],
) -> Result<Option<(u32, DirEntry)>> {
    let mut iter = open_dir(dev, sb, dir)?;
    while let Some(entry) = iter.next() {
        let entry = entry?;
        if entry.matches(name) {
            return Ok(Some((iter.position() - 1, entry)));
        }
    }
    Ok(None)
}

/// Look up a single component in directory `dir`
pub fn lookup<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, dir: InodeNo, name: &[u8]) -> Result<InodeNo> {
    match find_entry(dev, sb, dir, name)? {
        Some((_, entry)) => Ok(entry.inode),
        None => Err(FsError::NotFound(String::from_utf8_lossy(name).into_owned())),
    }
}

/// Resolve an absolute or relative path starting at the root directory
///
/// Empty components are skipped, so `"/"`, `""` and `"//"` all name the
/// root. Symbolic links are not followed.
pub fn resolve<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, path: &str) -> Result<InodeNo> {
    let mut ino = ROOT_INODE;
    let mut walked = String::new();

    for component in path.split('/').filter(|c| !c.is_empty()) {
        walked.push('/');
        walked.push_str(component);
        ino = match lookup(dev, sb, ino, component.as_bytes()) {
            Ok(found) => found,
            Err(FsError::NotFound(_)) => return Err(FsError::NotFound(walked)),
            Err(e) => return Err(e),
        };
        trace!("resolve: {} -> inode {}", walked, ino);
    }
    Ok(ino)
}

/// Inode attributes as stored on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub ino: InodeNo,
    pub mode: u16,
    pub nlink: u16,
    pub uid: u8,
    pub gid: u8,
    pub size: i32,
    pub atime: Timestamp,
    pub mtime: Timestamp,
    pub ctime: Timestamp,
}

impl Stat {
    pub fn from_inode(ino: InodeNo, inode: &Inode) -> Self {
        Self {
            ino,
            mode: inode.mode,
            nlink: inode.nlink,
            uid: inode.uid,
            gid: inode.gid,
            size: inode.size,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & crate::format::mode::IFDIR != 0
    }
}

pub fn stat<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, ino: InodeNo) -> Result<Stat> {
    Ok(Stat::from_inode(ino, &Inode::load(dev, sb, ino)?))
}

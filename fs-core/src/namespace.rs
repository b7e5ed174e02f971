//! Directory entry management: creating, linking and removing names
//!
//! Live entries are kept compact at the front of the directory. Removing a
//! name moves the last live entry into the hole and zeroes the slot it came
//! from, so the first zero entry always ends the listing.

use std::io::Cursor;

use log::{debug, warn};

use crate::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::dir::{find_entry, open_dir, ENTRIES_PER_BLOCK};
use crate::error::{FsError, Result};
use crate::extent::{grow, remove_inode};
use crate::format::{
    mode, DirEntry, Inode, InodeNo, Superblock, Timestamp, DIRENT_SIZE, LINK_MAX, MAX_NAME,
};
use crate::inode_alloc::{alloc_inode, free_inode};
use crate::layout::translate_read;

/// Check a name and cut it to the longest name the kernel accepts
fn entry_name(name: &[u8]) -> Result<&[u8]> {
    if name.is_empty() {
        return Err(FsError::InvalidArgument("empty name".into()));
    }
    if name.contains(&b'/') {
        return Err(FsError::InvalidArgument(format!(
            "name {:?} contains '/'",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(&name[..name.len().min(MAX_NAME)])
}

fn live_entries<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, dir: InodeNo) -> Result<u32> {
    let mut count = 0;
    for entry in open_dir(dev, sb, dir)? {
        entry?;
        count += 1;
    }
    Ok(count)
}

fn entry_block<D: BlockDevice + ?Sized>(dev: &mut D, dir: &Inode, pos: u32) -> Result<u64> {
    let block = translate_read(dev, dir, pos / ENTRIES_PER_BLOCK)?;
    if block == 0 {
        return Err(FsError::Corrupt(format!("directory slot {} has no data block", pos)));
    }
    Ok(block as u64)
}

fn read_entry<D: BlockDevice + ?Sized>(dev: &mut D, dir: &Inode, pos: u32) -> Result<DirEntry> {
    let block_no = entry_block(dev, dir, pos)?;
    let mut block = [0u8; BLOCK_SIZE];
    dev.read_block(block_no, &mut block)?;
    let offset = (pos % ENTRIES_PER_BLOCK) as usize * DIRENT_SIZE;
    Ok(DirEntry::read_from(&mut Cursor::new(&block[offset..offset + DIRENT_SIZE]))?)
}

fn write_entry<D: BlockDevice + ?Sized>(dev: &mut D, dir: &Inode, pos: u32, entry: &DirEntry) -> Result<()> {
    let block_no = entry_block(dev, dir, pos)?;
    let mut block = [0u8; BLOCK_SIZE];
    dev.read_block(block_no, &mut block)?;
    let offset = (pos % ENTRIES_PER_BLOCK) as usize * DIRENT_SIZE;
    entry.write_to(&mut Cursor::new(&mut block[offset..offset + DIRENT_SIZE]))?;
    dev.write_block(block_no, &block)?;
    Ok(())
}

fn touch<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, ino: InodeNo) -> Result<()> {
    let mut inode = Inode::load(dev, sb, ino)?;
    inode.mtime = Timestamp::now();
    inode.store(dev, sb, ino)
}

/// Append `name -> ino` to directory `dir`
///
/// Names longer than 13 bytes are truncated. The directory grows by one
/// entry when its size has no spare slot after the live entries.
pub fn add_entry<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &mut Superblock,
    dir: InodeNo,
    name: &[u8],
    ino: InodeNo,
) -> Result<()> {
    let name = entry_name(name)?;
    if ino == 0 {
        return Err(FsError::InvalidInode(0));
    }
    if find_entry(dev, sb, dir, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let pos = live_entries(dev, sb, dir)?;
    let needed = (pos as usize + 1) * DIRENT_SIZE;
    let dir_inode = Inode::load(dev, sb, dir)?;
    if needed > dir_inode.size.max(0) as usize {
        grow(dev, sb, dir, needed as i32)?;
    }

    let mut dir_inode = Inode::load(dev, sb, dir)?;
    write_entry(dev, &dir_inode, pos, &DirEntry::new(ino, name))?;
    dir_inode.mtime = Timestamp::now();
    dir_inode.store(dev, sb, dir)?;

    debug!(
        "namespace: {} -> inode {} at slot {} of directory {}",
        String::from_utf8_lossy(name),
        ino,
        pos,
        dir
    );
    Ok(())
}

/// Remove `name` from directory `dir` and return the entry it held
pub fn remove_entry<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &Superblock,
    dir: InodeNo,
    name: &[u8],
) -> Result<DirEntry> {
    let (pos, entry) = find_entry(dev, sb, dir, name)?
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;

    let last = live_entries(dev, sb, dir)? - 1;
    let dir_inode = Inode::load(dev, sb, dir)?;
    if pos != last {
        let moved = read_entry(dev, &dir_inode, last)?;
        write_entry(dev, &dir_inode, pos, &moved)?;
    }
    write_entry(dev, &dir_inode, last, &DirEntry::new(0, b""))?;
    touch(dev, sb, dir)?;

    debug!(
        "namespace: removed {} (inode {}) from directory {}",
        entry.name_lossy(),
        entry.inode,
        dir
    );
    Ok(entry)
}

/// Create an empty file called `name` in `dir`
///
/// Without file type bits in `file_mode` the file is a regular file.
pub fn create<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &mut Superblock,
    dir: InodeNo,
    name: &[u8],
    file_mode: u16,
) -> Result<InodeNo> {
    let name = entry_name(name)?;
    if find_entry(dev, sb, dir, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let file_mode = if file_mode & mode::IFMT == 0 {
        file_mode | mode::IFREG
    } else {
        file_mode
    };
    let ino = alloc_inode(dev, sb)?;
    Inode::new(file_mode, 1, Timestamp::now()).store(dev, sb, ino)?;

    if let Err(e) = add_entry(dev, sb, dir, name, ino) {
        if let Err(undo) = free_inode(dev, sb, ino) {
            warn!("namespace: could not release inode {}: {}", ino, undo);
        }
        return Err(e);
    }
    Ok(ino)
}

/// Create directory `name` in `parent` holding `.` and `..`
pub fn mkdir<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &mut Superblock,
    parent: InodeNo,
    name: &[u8],
    perm: u16,
) -> Result<InodeNo> {
    let name = entry_name(name)?;
    let mut parent_inode = Inode::load(dev, sb, parent)?;
    if !parent_inode.is_dir() {
        return Err(FsError::NotADirectory);
    }
    if parent_inode.nlink >= LINK_MAX {
        return Err(FsError::InvalidArgument(format!("directory {} has too many links", parent)));
    }
    if find_entry(dev, sb, parent, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let ino = alloc_inode(dev, sb)?;
    Inode::new(mode::IFDIR | (perm & mode::PERM_MASK), 2, Timestamp::now()).store(dev, sb, ino)?;

    let built = populate_dir(dev, sb, ino, parent).and_then(|_| add_entry(dev, sb, parent, name, ino));
    if let Err(e) = built {
        if let Err(undo) = remove_inode(dev, sb, ino) {
            warn!("namespace: could not release directory inode {}: {}", ino, undo);
        }
        return Err(e);
    }

    parent_inode = Inode::load(dev, sb, parent)?;
    parent_inode.nlink += 1;
    parent_inode.store(dev, sb, parent)?;
    Ok(ino)
}

fn populate_dir<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, ino: InodeNo, parent: InodeNo) -> Result<()> {
    grow(dev, sb, ino, 2 * DIRENT_SIZE as i32)?;
    let inode = Inode::load(dev, sb, ino)?;
    write_entry(dev, &inode, 0, &DirEntry::new(ino, b"."))?;
    write_entry(dev, &inode, 1, &DirEntry::new(parent, b".."))
}

/// Add a hard link `name` in `dir` to the non-directory `target`
pub fn link<D: BlockDevice + ?Sized>(
    dev: &mut D,
    sb: &mut Superblock,
    dir: InodeNo,
    name: &[u8],
    target: InodeNo,
) -> Result<()> {
    let mut inode = Inode::load(dev, sb, target)?;
    if inode.is_free() {
        return Err(FsError::InvalidInode(target as u32));
    }
    if inode.is_dir() {
        return Err(FsError::InvalidArgument("cannot hard link a directory".into()));
    }
    if inode.nlink >= LINK_MAX {
        return Err(FsError::InvalidArgument(format!("inode {} has too many links", target)));
    }

    add_entry(dev, sb, dir, name, target)?;
    inode.nlink += 1;
    inode.ctime = Timestamp::now();
    inode.store(dev, sb, target)
}

/// Remove `name` from `dir`, releasing the inode with its last link
pub fn unlink<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, dir: InodeNo, name: &[u8]) -> Result<()> {
    let (_, entry) = find_entry(dev, sb, dir, name)?
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let mut inode = Inode::load(dev, sb, entry.inode)?;
    if inode.is_dir() {
        return Err(FsError::InvalidArgument(format!(
            "{} is a directory",
            entry.name_lossy()
        )));
    }

    remove_entry(dev, sb, dir, name)?;
    inode.nlink = inode.nlink.saturating_sub(1);
    if inode.nlink == 0 {
        remove_inode(dev, sb, entry.inode)?;
        debug!("namespace: inode {} released", entry.inode);
    } else {
        inode.ctime = Timestamp::now();
        inode.store(dev, sb, entry.inode)?;
    }
    Ok(())
}

/// Remove the empty directory `name` from `parent`
pub fn rmdir<D: BlockDevice + ?Sized>(dev: &mut D, sb: &mut Superblock, parent: InodeNo, name: &[u8]) -> Result<()> {
    if matches!(name, b"." | b"..") {
        return Err(FsError::InvalidArgument("cannot remove . or ..".into()));
    }
    let (_, entry) = find_entry(dev, sb, parent, name)?
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;

    for child in open_dir(dev, sb, entry.inode)? {
        if !child?.is_dot() {
            return Err(FsError::NotEmpty);
        }
    }

    remove_entry(dev, sb, parent, name)?;
    remove_inode(dev, sb, entry.inode)?;

    let mut parent_inode = Inode::load(dev, sb, parent)?;
    parent_inode.nlink = parent_inode.nlink.saturating_sub(1);
    parent_inode.store(dev, sb, parent)
}

//! On-disk inode records

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{fit_bytes, InodeNo, Superblock, Timestamp, ADDR_SLOTS, INODE_SIZE};
use crate::blockdev::{BlockDevice, BLOCK_SIZE};
use crate::codec;
use crate::error::{FsError, Result};
use crate::layout::Layout;

/// Mode bits
pub mod mode {
    /// File type mask
    pub const IFMT: u16 = 0o170000;
    /// Symbolic link
    pub const IFLNK: u16 = 0o110000;
    /// Regular file
    pub const IFREG: u16 = 0o100000;
    /// Block special
    pub const IFBLK: u16 = 0o060000;
    /// Directory
    pub const IFDIR: u16 = 0o040000;
    /// Character special
    pub const IFCHR: u16 = 0o020000;
    /// Pipe
    pub const IFPIPE: u16 = 0o010000;

    pub const ISUID: u16 = 0o4000;
    pub const ISGID: u16 = 0o2000;
    pub const ISVTX: u16 = 0o1000;

    /// Permission bits
    pub const PERM_MASK: u16 = 0o7777;
}

/// On-disk inode structure (64 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inode {
    /// File mode and type
    pub mode: u16,
    /// Number of hard links
    pub nlink: u16,
    /// Owner user ID
    pub uid: u8,
    /// Owner group ID
    pub gid: u8,
    /// Size in bytes
    pub size: i32,
    /// Last access time
    pub atime: Timestamp,
    /// Last modification time
    pub mtime: Timestamp,
    /// Creation time
    pub ctime: Timestamp,
    /// 18 direct slots, the single-indirect root and the double-indirect root
    pub addr: [u16; ADDR_SLOTS],
    /// Padding word, carried through untouched
    pub pad: u16,
}

impl Inode {
    /// Size of an inode on disk
    pub const SIZE: usize = INODE_SIZE;

    /// A fresh inode with the given mode, link count and all times set to `now`
    pub fn new(mode: u16, nlink: u16, now: Timestamp) -> Self {
        Self {
            mode,
            nlink,
            atime: now,
            mtime: now,
            ctime: now,
            ..Default::default()
        }
    }

    /// Read an inode record
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mode = reader.read_u16::<LittleEndian>()?;
        let nlink = reader.read_u16::<LittleEndian>()?;
        let mut owner = [0u8; 2];
        codec::read_u8s(reader, &mut owner)?;
        let [uid, gid] = owner;
        let mut size = [0i32; 1];
        codec::read_i32s(reader, &mut size)?;
        let size = size[0];
        let atime = Timestamp::read_from(reader)?;
        let mtime = Timestamp::read_from(reader)?;
        let ctime = Timestamp::read_from(reader)?;
        let mut addr = [0u16; ADDR_SLOTS];
        codec::read_u16s(reader, &mut addr)?;
        let pad = reader.read_u16::<LittleEndian>()?;

        Ok(Self {
            mode,
            nlink,
            uid,
            gid,
            size,
            atime,
            mtime,
            ctime,
            addr,
            pad,
        })
    }

    /// Write an inode record (exactly 64 bytes)
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.mode)?;
        writer.write_u16::<LittleEndian>(self.nlink)?;
        codec::write_u8s(writer, &[self.uid, self.gid])?;
        codec::write_i32s(writer, &[self.size])?;
        self.atime.write_to(writer)?;
        self.mtime.write_to(writer)?;
        self.ctime.write_to(writer)?;
        codec::write_u16s(writer, &self.addr)?;
        writer.write_u16::<LittleEndian>(self.pad)?;
        Ok(())
    }

    /// Block number and byte offset of inode `ino`
    pub fn location(sb: &Superblock, ino: InodeNo) -> Result<(u64, usize)> {
        if ino as u32 >= sb.inode_capacity() {
            return Err(FsError::InvalidInode(ino as u32));
        }
        Ok(Layout::new(sb).inode_block(ino))
    }

    /// Load inode `ino` from the inode area
    pub fn load<D: BlockDevice + ?Sized>(dev: &mut D, sb: &Superblock, ino: InodeNo) -> Result<Self> {
        let (block_num, offset) = Self::location(sb, ino)?;
        let mut block = [0u8; BLOCK_SIZE];
        dev.read_block(block_num, &mut block)?;
        Ok(Self::read_from(&mut Cursor::new(&block[offset..offset + INODE_SIZE]))?)
    }

    /// Store this record as inode `ino`, rewriting only its 64 bytes
    pub fn store<D: BlockDevice + ?Sized>(&self, dev: &mut D, sb: &Superblock, ino: InodeNo) -> Result<()> {
        let (block_num, offset) = Self::location(sb, ino)?;
        let mut block = [0u8; BLOCK_SIZE];
        dev.read_block(block_num, &mut block)?;
        self.write_to(&mut Cursor::new(&mut block[offset..offset + INODE_SIZE]))?;
        dev.write_block(block_num, &block)?;
        Ok(())
    }

    /// Whether the record is unused
    pub fn is_free(&self) -> bool {
        self.mode == 0 && self.nlink == 0
    }

    /// File type bits
    pub fn file_type(&self) -> u16 {
        self.mode & mode::IFMT
    }

    /// Whether the directory bit is set
    pub fn is_dir(&self) -> bool {
        self.mode & mode::IFDIR != 0
    }

    /// Whether this is a regular file
    pub fn is_regular(&self) -> bool {
        self.file_type() == mode::IFREG
    }

    /// Whether this is a symbolic link
    pub fn is_symlink(&self) -> bool {
        self.file_type() == mode::IFLNK
    }

    /// Data blocks covered by the current size
    pub fn block_count(&self) -> u32 {
        fit_bytes(self.size)
    }

    /// `ls`-style ten character mode string
    pub fn permissions_string(&self) -> String {
        permissions_string(self.mode)
    }
}

fn flag_set(value: u16, flag: u16) -> bool {
    value & flag == flag
}

/// Render mode bits the way the listing tool prints them
pub fn permissions_string(m: u16) -> String {
    let mut perm = [b'-'; 10];

    perm[0] = match m & mode::IFMT {
        mode::IFDIR => b'd',
        mode::IFLNK => b'l',
        mode::IFBLK => b'b',
        mode::IFCHR => b'c',
        mode::IFPIPE => b'p',
        _ => b'-',
    };
    if flag_set(m, mode::ISVTX) {
        perm[0] = b't';
    }

    let rwx = [b'r', b'w', b'x'];
    for (i, slot) in perm[1..].iter_mut().enumerate() {
        if flag_set(m, 0o400 >> i) {
            *slot = rwx[i % 3];
        }
    }

    if flag_set(m, mode::ISUID) {
        perm[3] = b's';
    }
    if flag_set(m, mode::ISGID) {
        perm[6] = b's';
    }

    String::from_utf8_lossy(&perm).into_owned()
}

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{InodeNo, DIRENT_SIZE, NAME_LEN};
use crate::codec;

/// Directory entry structure (16 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number, 0 marks the end of the live entries
    pub inode: InodeNo,
    /// Zero-padded name; not terminated when all 14 bytes are used
    pub name: [u8; NAME_LEN],
}

impl DirEntry {
    /// Size of a directory entry on disk
    pub const SIZE: usize = DIRENT_SIZE;

    /// Create an entry; names longer than 14 bytes are cut
    pub fn new(inode: InodeNo, name: &[u8]) -> Self {
        let mut field = [0u8; NAME_LEN];
        let len = name.len().min(NAME_LEN);
        field[..len].copy_from_slice(&name[..len]);
        Self { inode, name: field }
    }

    /// Name bytes up to the first zero
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        &self.name[..len]
    }

    /// Name as text, lossily decoded
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    /// Whether the entry carries `name`; names over 14 bytes never match
    pub fn matches(&self, name: &[u8]) -> bool {
        if name.len() > NAME_LEN {
            return false;
        }
        let mut field = [0u8; NAME_LEN];
        field[..name.len()].copy_from_slice(name);
        field == self.name
    }

    /// Whether this is the `.` or `..` entry
    pub fn is_dot(&self) -> bool {
        matches!(self.name_bytes(), b"." | b"..")
    }

    /// Read an entry
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let inode = reader.read_u16::<LittleEndian>()?;
        let mut name = [0u8; NAME_LEN];
        codec::read_u8s(reader, &mut name)?;
        Ok(Self { inode, name })
    }

    /// Write an entry
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.inode)?;
        codec::write_u8s(writer, &self.name)
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirEntry")
            .field("inode", &self.inode)
            .field("name", &self.name_lossy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_layout() {
        let entry = DirEntry::new(0x0201, b"readme.txt");
        let mut out = Vec::new();
        entry.write_to(&mut out).unwrap();
        assert_eq!(out.len(), DirEntry::SIZE);
        assert_eq!(&out[..2], &[0x01, 0x02]);
        assert_eq!(&out[2..12], b"readme.txt");
        assert!(out[12..].iter().all(|&b| b == 0));
        assert_eq!(DirEntry::read_from(&mut &out[..]).unwrap(), entry);
    }

    #[test]
    fn test_full_length_name_is_not_terminated() {
        let entry = DirEntry::new(5, b"abcdefghijklmn");
        assert_eq!(entry.name_bytes(), b"abcdefghijklmn");
        assert!(entry.matches(b"abcdefghijklmn"));
        assert!(!entry.matches(b"abcdefghijklmno"));
        assert!(!entry.matches(b"abcdefghijklm"));
    }

    #[test]
    fn test_matching_is_exact() {
        let entry = DirEntry::new(3, b"bin");
        assert!(entry.matches(b"bin"));
        assert!(!entry.matches(b"BIN"));
        assert!(!entry.matches(b"bi"));
        assert!(!entry.matches(b""));
        assert!(DirEntry::new(1, b"..").is_dot());
        assert!(!entry.is_dot());
    }
}

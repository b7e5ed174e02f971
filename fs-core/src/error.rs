use std::io;

use thiserror::Error;

use crate::blockdev::BlockDeviceError;

/// Filesystem error type
#[derive(Error, Debug)]
pub enum FsError {
    /// The underlying device failed or transferred a short block
    #[error("I/O error: {0}")]
    Io(#[from] BlockDeviceError),
    /// No free blocks or inodes are left
    #[error("No space left on filesystem")]
    NoSpace,
    /// Allocator or address bookkeeping violates an on-disk invariant
    #[error("Filesystem is corrupt: {0}")]
    Corrupt(String),
    /// A block rank lies beyond the double-indirect ceiling
    #[error("Block rank {0} is out of range")]
    OutOfRange(u32),
    /// Inode number outside the inode area
    #[error("Invalid inode number {0}")]
    InvalidInode(u32),
    /// A path component or directory entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not a directory")]
    NotADirectory,
    #[error("File already exists")]
    AlreadyExists,
    #[error("Directory not empty")]
    NotEmpty,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Superblock signature does not match the UZIX magic number
    #[error("Bad superblock signature {0}")]
    BadSignature(u16),
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::Io(BlockDeviceError::Io(err))
    }
}

impl FsError {
    /// Whether the error means the filesystem simply ran out of room.
    pub fn is_no_space(&self) -> bool {
        matches!(self, FsError::NoSpace)
    }

    /// Whether the error points at broken on-disk bookkeeping.
    pub fn is_corruption(&self) -> bool {
        matches!(self, FsError::Corrupt(_) | FsError::BadSignature(_))
    }
}

/// Result type for filesystem operations
pub type Result<T> = std::result::Result<T, FsError>;

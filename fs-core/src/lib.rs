//! UZIX filesystem engine
//!
//! Reads, creates and modifies UZIX disk images: 512-byte blocks, a
//! superblock with cached free-block and free-inode lists, 64-byte inodes
//! addressing file data through direct, single-indirect and double-indirect
//! slots, and 16-byte directory entries.
//!
//! [`DiskFs`] is the usual entry point. The free functions in each module
//! take the device and superblock explicitly for callers that manage those
//! themselves.

#![warn(rust_2018_idioms)]

pub mod block_alloc;
pub mod blockdev;
pub mod codec;
pub mod config;
pub mod dir;
pub mod error;
pub mod extent;
pub mod format;
pub mod fs;
pub mod inode_alloc;
pub mod layout;
pub mod namespace;
pub mod report;

pub use blockdev::{BlockDevice, FileBackedBlockDevice, MemoryBlockDevice, BLOCK_SIZE};
pub use config::{FormatConfig, SizeSpec};
pub use dir::{DirIter, Stat};
pub use error::{FsError, Result};
pub use format::{mode, DirEntry, Inode, InodeNo, BlockNo, Superblock, Timestamp, ROOT_INODE};
pub use fs::DiskFs;
pub use report::UsageReport;

/// Re-export common types and traits
pub mod prelude {
    pub use crate::blockdev::BlockDevice;
    pub use crate::error::{FsError, Result};
    pub use crate::fs::DiskFs;
}

//! Superblock summary and usage table

use std::fmt;

use serde::Serialize;

use crate::blockdev::BLOCK_SIZE;
use crate::format::{Superblock, INODES_PER_BLOCK};

/// One line of the usage table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRow {
    pub label: &'static str,
    /// Inode records, for the inode rows only
    pub units: Option<i64>,
    pub blocks: i64,
    pub bytes: i64,
    pub kbytes: i64,
    /// Share of the whole image in bytes
    pub percent: f64,
}

impl UsageRow {
    fn new(label: &'static str, units: Option<i64>, blocks: i64, total_bytes: i64) -> Self {
        let bytes = blocks * BLOCK_SIZE as i64;
        let percent = if total_bytes > 0 {
            100.0 * bytes as f64 / total_bytes as f64
        } else {
            0.0
        };
        Self {
            label,
            units,
            blocks,
            bytes,
            kbytes: bytes / 1024,
            percent,
        }
    }
}

/// Everything the info command prints about one image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub block_size: usize,
    pub checks: usize,
    pub failures: Vec<String>,
    pub first_inode_block: u16,
    pub inode_blocks: u16,
    pub total_blocks: u16,
    pub free_blocks: u16,
    /// Cached free blocks, without the end-of-chain marker
    pub cached_blocks: Vec<u16>,
    pub free_inodes: u16,
    pub cached_inodes: Vec<u16>,
    pub last_modified: String,
    pub rows: Vec<UsageRow>,
}

impl UsageReport {
    pub fn from_superblock(sb: &Superblock) -> Self {
        let failures: Vec<String> = sb.validate().iter().map(|v| v.to_string()).collect();

        let cached = sb.free_cache.entries();
        let cached_blocks = match cached.first() {
            Some(0) => cached[1..].to_vec(),
            _ => cached.to_vec(),
        };

        let rows = if failures.is_empty() { usage_rows(sb) } else { Vec::new() };

        Self {
            block_size: BLOCK_SIZE,
            checks: Superblock::CHECKS,
            failures,
            first_inode_block: sb.first_inode_block,
            inode_blocks: sb.inode_blocks,
            total_blocks: sb.total_blocks,
            free_blocks: sb.free_blocks,
            cached_blocks,
            free_inodes: sb.free_inodes,
            cached_inodes: sb.inode_cache.entries().to_vec(),
            last_modified: sb.time.to_string(),
            rows,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.failures.is_empty()
    }
}

fn usage_rows(sb: &Superblock) -> Vec<UsageRow> {
    let ipb = INODES_PER_BLOCK as i64;
    let total_blocks = sb.total_blocks as i64;
    let inode_blocks = sb.inode_blocks as i64;
    let first_inode = sb.first_inode_block as i64;
    let free = sb.free_blocks as i64;
    let total_bytes = total_blocks * BLOCK_SIZE as i64;

    let used_inodes = inode_blocks * ipb - sb.free_inodes as i64;
    let used_inode_blocks = (used_inodes + ipb - 1).div_euclid(ipb);
    let data_all = total_blocks - (inode_blocks + first_inode);

    vec![
        UsageRow::new("total", None, total_blocks, total_bytes),
        UsageRow::new("inodes (reserved)", Some(inode_blocks * ipb), inode_blocks, total_bytes),
        UsageRow::new("inodes (used)", Some(used_inodes), used_inode_blocks, total_bytes),
        UsageRow::new("boot+superblock", None, 2, total_bytes),
        UsageRow::new("reserved/unused", None, first_inode - 2, total_bytes),
        UsageRow::new("data blocks (all)", None, data_all, total_bytes),
        UsageRow::new("data blocks (used)", None, data_all - free, total_bytes),
        UsageRow::new("data blocks (free)", None, free, total_bytes),
    ]
}

fn write_list(f: &mut fmt::Formatter<'_>, label: &str, values: &[u16]) -> fmt::Result {
    if values.is_empty() {
        return Ok(());
    }
    write!(f, "({}:", label)?;
    for value in values {
        write!(f, " {}", value)?;
    }
    writeln!(f, " )")
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "1 block = {} bytes", self.block_size)?;
        for failure in &self.failures {
            writeln!(f, "!! super block inconsistency: {}", failure)?;
        }
        writeln!(
            f,
            "{} superblock sanity checks performed, {} failure(s).",
            self.checks,
            self.failures.len()
        )?;
        if !self.is_consistent() {
            return Ok(());
        }

        writeln!(f, "first inode block         : {}", self.first_inode_block)?;
        writeln!(f, "inode blocks              : {}", self.inode_blocks)?;
        writeln!(f, "total blocks              : {}", self.total_blocks)?;
        writeln!(f)?;
        writeln!(f, "available data blocks     : {}", self.free_blocks)?;
        writeln!(f, "cached avail. data blocks : {}", self.cached_blocks.len())?;
        write_list(f, "block cache", &self.cached_blocks)?;
        writeln!(f)?;
        writeln!(f, "available inodes          : {}", self.free_inodes)?;
        writeln!(f, "cached available inodes   : {}", self.cached_inodes.len())?;
        write_list(f, "inode cache", &self.cached_inodes)?;
        writeln!(f)?;
        writeln!(f, "last modified             : {}", self.last_modified)?;
        writeln!(f)?;

        let rule = format!("{}+{}", "-".repeat(19), "-".repeat(49));
        writeln!(f, "{}", rule)?;
        writeln!(
            f,
            "usage summary      |      units    blocks     bytes    kbytes       %"
        )?;
        writeln!(f, "{}", rule)?;
        for row in &self.rows {
            let units = row.units.map_or_else(|| "-".to_string(), |u| u.to_string());
            writeln!(
                f,
                "{:<19}|  {:>9} {:>9} {:>9} {:>9} {:>6.1}%",
                row.label, units, row.blocks, row.bytes, row.kbytes, row.percent
            )?;
        }
        writeln!(f, "{}", rule)
    }
}

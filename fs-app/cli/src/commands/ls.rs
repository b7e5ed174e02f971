//! Recursive directory listing

use std::collections::HashSet;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;

use uzixfs::{BlockDevice, DiskFs, InodeNo};

/// List a directory tree
#[derive(Parser, Debug)]
#[command(about = "List the contents of a UZIX image")]
pub struct LsArgs {
    /// Image file
    pub image: PathBuf,

    /// Directory to start from
    #[arg(default_value = "/")]
    pub path: String,
}

pub fn run(args: LsArgs) -> Result<()> {
    let mut fs = super::open_image(&args.image)?;
    let ino = fs
        .resolve(&args.path)
        .with_context(|| format!("cannot resolve {}", args.path))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut visited = HashSet::new();
    let path = args.path.trim_end_matches('/').to_string();
    walk(&mut fs, &mut out, ino, &path, &mut visited)
}

fn walk<D: BlockDevice, W: Write>(
    fs: &mut DiskFs<D>,
    out: &mut W,
    dir: InodeNo,
    path: &str,
    visited: &mut HashSet<InodeNo>,
) -> Result<()> {
    if !visited.insert(dir) {
        warn!("{} loops back to inode {}, not descending", path, dir);
        return Ok(());
    }

    let entries = fs
        .read_dir(dir)
        .with_context(|| format!("cannot read directory {}", display_path(path)))?;

    writeln!(out, "{}:", display_path(path))?;
    let mut subdirs = Vec::new();
    for entry in entries.iter().filter(|e| !e.is_dot()) {
        let st = fs
            .stat(entry.inode)
            .with_context(|| format!("cannot stat {}/{}", path, entry.name_lossy()))?;
        writeln!(
            out,
            "{} {:>3} {:>3}:{:<3} {:>8} {:>19} {}",
            uzixfs::format::permissions_string(st.mode),
            st.nlink,
            st.uid,
            st.gid,
            st.size,
            st.mtime.to_string(),
            entry.name_lossy()
        )?;
        if st.is_dir() {
            subdirs.push((entry.inode, format!("{}/{}", path, entry.name_lossy())));
        }
    }
    writeln!(out)?;

    for (ino, sub) in subdirs {
        walk(fs, out, ino, &sub, visited)?;
    }
    Ok(())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

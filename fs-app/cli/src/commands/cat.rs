//! Dump a file to standard output

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use uzixfs::BLOCK_SIZE;

/// Copy a file's contents to standard output
#[derive(Parser, Debug)]
#[command(about = "Print a file stored in a UZIX image")]
pub struct CatArgs {
    /// Image file
    pub image: PathBuf,

    /// Path of the file inside the image
    pub path: String,
}

pub fn run(args: CatArgs) -> Result<()> {
    let mut fs = super::open_image(&args.image)?;
    let ino = fs
        .resolve(&args.path)
        .with_context(|| format!("file not found on given image: {}", args.path))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut buf = [0u8; BLOCK_SIZE];
    let mut offset = 0u32;
    loop {
        let n = fs
            .read_data(ino, offset, &mut buf)
            .with_context(|| format!("error reading {}", args.path))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u32;
    }
    out.flush()?;
    Ok(())
}

pub mod cat;
pub mod info;
pub mod ls;
pub mod mkfs;

use std::path::Path;

use anyhow::{Context, Result};
use uzixfs::{DiskFs, FileBackedBlockDevice};

/// Open an image read-only
pub fn open_image(path: &Path) -> Result<DiskFs<FileBackedBlockDevice>> {
    let dev = FileBackedBlockDevice::open(path, true)
        .with_context(|| format!("cannot open {}", path.display()))?;
    DiskFs::open(dev).with_context(|| format!("{} is not a usable UZIX image", path.display()))
}

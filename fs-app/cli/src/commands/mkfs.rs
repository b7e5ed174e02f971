//! Create a filesystem image

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use uzixfs::{DiskFs, FileBackedBlockDevice, FormatConfig, SizeSpec};

/// Create a fresh filesystem image
#[derive(Parser, Debug)]
#[command(about = "Create a UZIX filesystem image")]
pub struct MkfsArgs {
    /// Image file to create
    pub image: PathBuf,

    /// Image size: bytes, or a number followed by b (blocks) or K (KiB)
    #[arg(short = 'f', long = "fsize")]
    pub fsize: Option<SizeSpec>,

    /// Size of the inode area
    #[arg(short = 'i', long = "isize")]
    pub isize: Option<SizeSpec>,

    /// Size of the reserved area after the superblock
    #[arg(short = 'r', long = "reserved")]
    pub reserved: Option<SizeSpec>,

    /// JSON file with the sizes; options given here override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overwrite an existing image
    #[arg(long)]
    pub force: bool,

    /// Print nothing on success
    #[arg(short, long)]
    pub quiet: bool,
}

pub fn run(args: MkfsArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => FormatConfig::from_json_file(path)
            .with_context(|| format!("cannot load {}", path.display()))?,
        None => FormatConfig::default(),
    };
    if let Some(size) = args.fsize {
        config.image_size = size;
    }
    if let Some(size) = args.isize {
        config.inode_size = size;
    }
    if let Some(size) = args.reserved {
        config.reserved_size = size;
    }
    config.validate().context("illegal filesystem layout")?;

    if args.image.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.image.display());
    }

    if !args.quiet {
        println!(
            "creating filesystem: {} blocks ({} for inodes, {} reserved, {} data)",
            config.total_blocks(),
            config.inode_blocks(),
            config.reserved_blocks(),
            config.data_blocks()
        );
    }

    let dev = FileBackedBlockDevice::create(&args.image, config.image_size.bytes())
        .with_context(|| format!("cannot create {}", args.image.display()))?;
    let mut fs = DiskFs::format(dev, &config).context("filesystem creation failed")?;
    fs.sync().context("filesystem creation failed")?;

    info!(
        "{}: {} free blocks, {} free inodes",
        args.image.display(),
        fs.superblock().free_blocks,
        fs.superblock().free_inodes
    );
    if !args.quiet {
        println!("done.");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uzixfs::ROOT_INODE;

    fn args(image: PathBuf) -> MkfsArgs {
        MkfsArgs {
            image,
            fsize: Some(SizeSpec::from_blocks(720)),
            isize: None,
            reserved: Some(SizeSpec::from_blocks(2)),
            config: None,
            force: false,
            quiet: true,
        }
    }

    #[test]
    fn test_mkfs_creates_usable_image() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("disk.dsk");
        run(args(image.clone())).unwrap();

        assert_eq!(std::fs::metadata(&image).unwrap().len(), 720 * 512);
        let mut fs = super::super::open_image(&image).unwrap();
        assert_eq!(fs.superblock().first_inode_block, 4);
        assert_eq!(fs.read_dir(ROOT_INODE).unwrap().len(), 2);
    }

    #[test]
    fn test_existing_image_needs_force() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("disk.dsk");
        run(args(image.clone())).unwrap();
        assert!(run(args(image.clone())).is_err());

        let mut forced = args(image);
        forced.force = true;
        run(forced).unwrap();
    }

    #[test]
    fn test_config_file_is_overridden_by_flags() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("layout.json");
        std::fs::write(&config_path, r#"{"image_size": "100b", "inode_size": "4b"}"#).unwrap();

        let image = dir.path().join("small.dsk");
        let mut a = args(image.clone());
        a.config = Some(config_path);
        a.fsize = None;
        run(a).unwrap();

        let fs = super::super::open_image(&image).unwrap();
        assert_eq!(fs.superblock().total_blocks, 100);
        assert_eq!(fs.superblock().inode_blocks, 4);
        assert_eq!(fs.superblock().first_inode_block, 4);
    }
}

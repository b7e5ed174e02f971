//! Superblock checks and usage summary

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use log::warn;
use serde_json::json;

use uzixfs::{FileBackedBlockDevice, Superblock, UsageReport};

/// Check superblocks and print usage summaries
#[derive(Parser, Debug)]
#[command(about = "Show superblock information for UZIX images")]
pub struct InfoArgs {
    /// Image files
    #[arg(required = true)]
    pub images: Vec<PathBuf>,

    /// Print the reports as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: InfoArgs) -> Result<()> {
    let mut reports = Vec::new();
    let mut readable = 0;

    for image in &args.images {
        let mut dev = match FileBackedBlockDevice::open(image, true) {
            Ok(dev) => dev,
            Err(e) => {
                warn!("unable to open {} for reading, skipping: {}", image.display(), e);
                continue;
            }
        };
        let report = match Superblock::load(&mut dev) {
            Ok(sb) => UsageReport::from_superblock(&sb),
            Err(e) => {
                warn!("error reading superblock of {}: {}", image.display(), e);
                continue;
            }
        };
        readable += 1;

        if args.json {
            reports.push(json!({
                "image": image.display().to_string(),
                "report": report,
            }));
        } else {
            println!("UZIX fs: {}", image.display());
            println!("{}", report);
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    if readable == 0 {
        bail!("no readable image given");
    }
    Ok(())
}

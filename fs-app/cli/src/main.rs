//! UZIX filesystem command line interface
//!
//! Creates, lists, dumps and inspects UZIX disk images.

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, LevelFilter};

mod commands;

/// Tools for UZIX filesystem images
#[derive(Parser)]
#[command(
    name = "uzixfs",
    about = "UZIX filesystem image tools",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fresh filesystem image
    Mkfs(commands::mkfs::MkfsArgs),

    /// List a directory tree
    Ls(commands::ls::LsArgs),

    /// Copy a file's contents to standard output
    Cat(commands::cat::CatArgs),

    /// Check superblocks and print usage summaries
    Info(commands::info::InfoArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };

    env_logger::Builder::new().filter_level(log_level).init();

    debug!("uzixfs v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Mkfs(args) => commands::mkfs::run(args),
        Commands::Ls(args) => commands::ls::run(args),
        Commands::Cat(args) => commands::cat::run(args),
        Commands::Info(args) => commands::info::run(args),
    }
}

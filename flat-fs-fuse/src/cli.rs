use clap::{Parser, Subcommand};
use flat_fs::Geometry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about = "Store host files in a flat-fs backing file")]
pub struct Cli {
    /// Backing file of the file system
    #[arg(long, short, default_value = "vfs")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the backing file with an empty file system
    Format {
        /// Bytes per block, a power of two of at least 512
        #[arg(long, short, default_value_t = Geometry::default().block_size)]
        block_size: u32,

        /// Number of inode slots
        #[arg(long, short, default_value_t = Geometry::default().inode_count)]
        inodes: u32,

        /// Number of blocks in the data area
        #[arg(long, short, default_value_t = Geometry::default().data_blocks)]
        data_blocks: u32,
    },

    /// Delete the backing file
    Remove,

    /// Copy a host file in, under its file name
    Import { path: PathBuf },

    /// Copy a stored file out to `<out-dir>/copy_<name>`
    Export {
        name: String,

        #[arg(long, short = 'O', default_value = ".")]
        out_dir: PathBuf,
    },

    /// Remove a stored file
    Delete { name: String },

    /// Show stored files and their sizes
    List,

    /// Show the regions of the backing file
    Map,

    /// Cross-check counters, bitmaps and inode records
    Check,
}

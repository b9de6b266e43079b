//! `pennos <fat_image> [log_file]` (spec.md §6).

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "pennos", about = "A pedagogical user-space operating system")]
pub struct Args {
    /// Path to a FAT16-style image created by `mkfs`.
    pub fat_image: PathBuf,

    /// Where to write tab-separated scheduling-event logs; stderr if omitted.
    pub log_file: Option<PathBuf>,
}

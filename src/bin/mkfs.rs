//! `mkfs <fs_name> <blocks_in_fat> <block_size_config>` (spec.md §6).
//!
//! Grounded on `original_source/src/pennfat/mkfs.c`: zero out the whole
//! image (FAT region plus data region) first, then seek back and write
//! the geometry entry and the root directory's chain terminator.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use clap::Parser;
use pennos::fs::fat::{Geometry, FAT_EOC};

#[derive(Debug, Parser)]
#[command(name = "mkfs", about = "Formats a FAT16-style PennOS filesystem image")]
struct Args {
    /// Path of the image file to create; must not already exist.
    fs_name: PathBuf,

    /// Number of blocks making up the FAT region (1..=32).
    blocks_in_fat: u8,

    /// Block size selector: 0=256 1=512 2=1024 3=2048 4=4096 bytes.
    block_size_config: u8,
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(&args) {
        eprintln!("mkfs: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let geometry = Geometry::new(args.blocks_in_fat, args.block_size_config)
        .map_err(|e| anyhow::anyhow!("invalid geometry: {e}"))?;

    let block_size = geometry.block_size() as usize;
    let total_blocks = args.blocks_in_fat as u64 + geometry.data_block_count() as u64;

    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&args.fs_name)
        .map_err(|e| anyhow::anyhow!("failed to create {:?}: {e}", args.fs_name))?;

    let empty_block = vec![0u8; block_size];
    for _ in 0..total_blocks {
        file.write_all(&empty_block)?;
    }

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&geometry.to_entry().to_le_bytes())?;
    file.write_all(&FAT_EOC.to_le_bytes())?;
    file.flush()?;

    Ok(())
}

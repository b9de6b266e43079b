pub mod dentry;
pub mod error;
pub mod fat;
pub mod fd;
pub mod syscalls;

use std::path::Path;

use crate::fs::error::FsResult;
use crate::fs::fat::FatFs;
use crate::fs::fd::GlobalFdTable;

/// Wires the mounted FAT16 image together with the process-shared global
/// FD table — the single filesystem-layer state a `Kernel` owns.
pub struct Fs {
    pub fat: FatFs,
    pub global_fds: GlobalFdTable,
}

impl Fs {
    pub fn mount(path: impl AsRef<Path>) -> FsResult<Self> {
        Ok(Fs {
            fat: FatFs::mount(path)?,
            global_fds: GlobalFdTable::new(),
        })
    }
}

//! Global and per-process file-descriptor tables (spec.md §3/§4.4).
//!
//! Grounded on the teacher's `fs::fd::File` (shared handle behind
//! `Arc<Mutex<_>>`, `readable`/`writable` flags) generalized into the
//! two-level table this spec requires: a process-shared table of open
//! files plus, per PCB, a small fixed-size array mapping local integer
//! fds onto entries in the shared table.

use crate::fs::error::{FsError, FsResult};

pub const PROCESS_FD_TABLE_SIZE: usize = 1024;

pub const STDIN_FD: i32 = 0;
pub const STDOUT_FD: i32 = 1;
pub const STDERR_FD: i32 = 2;

/// `F_READ/F_WRITE/F_APPEND` per DESIGN.md's resolved open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read = 0,
    Write = 1,
    Append = 2,
}

/// One process-shared open-file record. `root_dir_slot` is the index of
/// the owning directory entry in the root-directory chain.
#[derive(Debug, Clone)]
pub struct GlobalFdEntry {
    pub root_dir_slot: usize,
    pub offset: u64,
    pub ref_count: u32,
    pub write_lock: bool,
    pub mode: OpenMode,
}

#[derive(Default)]
pub struct GlobalFdTable {
    entries: Vec<Option<GlobalFdEntry>>,
}

impl GlobalFdTable {
    pub fn new() -> Self {
        GlobalFdTable {
            entries: Vec::new(),
        }
    }

    /// Allocate a new global entry, reusing a freed slot if one exists.
    pub fn allocate(&mut self, entry: GlobalFdEntry) -> usize {
        for (i, slot) in self.entries.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(entry);
                return i;
            }
        }
        self.entries.push(Some(entry));
        self.entries.len() - 1
    }

    /// Share an already-open entry (used when READ opens an already-open
    /// file): bumps `ref_count` and returns the same index.
    pub fn share(&mut self, index: usize) -> FsResult<usize> {
        let entry = self.get_mut(index)?;
        entry.ref_count += 1;
        Ok(index)
    }

    pub fn get(&self, index: usize) -> FsResult<&GlobalFdEntry> {
        self.entries
            .get(index)
            .and_then(|s| s.as_ref())
            .ok_or(FsError::FdNotInTable)
    }

    pub fn get_mut(&mut self, index: usize) -> FsResult<&mut GlobalFdEntry> {
        self.entries
            .get_mut(index)
            .and_then(|s| s.as_mut())
            .ok_or(FsError::FdNotInTable)
    }

    /// Find an already-open entry for `root_dir_slot`, if any, returning
    /// its table index.
    pub fn find_by_dir_slot(&self, root_dir_slot: usize) -> Option<usize> {
        self.entries.iter().enumerate().find_map(|(i, s)| {
            s.as_ref()
                .filter(|e| e.root_dir_slot == root_dir_slot)
                .map(|_| i)
        })
    }

    /// Drop one reference; frees the slot once `ref_count` hits zero.
    /// Returns `true` if the entry was freed (caller should flush the
    /// directory entry).
    pub fn release(&mut self, index: usize) -> FsResult<bool> {
        let entry = self.get_mut(index)?;
        entry.ref_count = entry.ref_count.saturating_sub(1);
        if entry.ref_count == 0 {
            self.entries[index] = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn total_ref_count(&self) -> u32 {
        self.entries
            .iter()
            .filter_map(|s| s.as_ref())
            .map(|e| e.ref_count)
            .sum()
    }

    pub fn write_locked_count_for(&self, root_dir_slot: usize) -> usize {
        self.entries
            .iter()
            .filter_map(|s| s.as_ref())
            .filter(|e| e.root_dir_slot == root_dir_slot && e.write_lock)
            .count()
    }
}

/// One process-local fd slot: `{ in_use, global_fd_index, local_offset,
/// mode }`. `local_offset` is authoritative for reads; `lseek` updates
/// it, and the syscall layer copies it into the global entry before each
/// kernel operation and back out after.
#[derive(Debug, Clone, Copy)]
pub struct ProcessFdEntry {
    pub in_use: bool,
    pub global_fd_index: usize,
    pub local_offset: u64,
    pub mode: OpenMode,
}

impl Default for ProcessFdEntry {
    fn default() -> Self {
        ProcessFdEntry {
            in_use: false,
            global_fd_index: 0,
            local_offset: 0,
            mode: OpenMode::Read,
        }
    }
}

#[derive(Clone)]
pub struct ProcessFdTable {
    slots: Vec<ProcessFdEntry>,
}

impl ProcessFdTable {
    /// A fresh table with slots 0/1/2 preloaded to the standard streams,
    /// each pointing at `global_fd_index` `fd` (the scheduler wires up
    /// three matching console entries in the global table at boot).
    pub fn new_with_std_streams() -> Self {
        let mut slots = vec![ProcessFdEntry::default(); PROCESS_FD_TABLE_SIZE];
        for (i, slot) in slots.iter_mut().enumerate().take(3) {
            *slot = ProcessFdEntry {
                in_use: true,
                global_fd_index: i,
                local_offset: 0,
                mode: if i == STDIN_FD as usize {
                    OpenMode::Read
                } else {
                    OpenMode::Write
                },
            };
        }
        ProcessFdTable { slots }
    }

    /// Deep copy used on `spawn` (fork-style inheritance, §4.4).
    pub fn fork_from(parent: &ProcessFdTable) -> Self {
        parent.clone()
    }

    pub fn find_free_slot(&self) -> FsResult<i32> {
        self.slots
            .iter()
            .position(|s| !s.in_use)
            .map(|i| i as i32)
            .ok_or(FsError::FdOutOfRange)
    }

    pub fn get(&self, local_fd: i32) -> FsResult<&ProcessFdEntry> {
        if local_fd < 0 {
            return Err(FsError::FdOutOfRange);
        }
        let slot = self
            .slots
            .get(local_fd as usize)
            .ok_or(FsError::FdOutOfRange)?;
        if !slot.in_use {
            return Err(FsError::FdNotInTable);
        }
        Ok(slot)
    }

    pub fn get_mut(&mut self, local_fd: i32) -> FsResult<&mut ProcessFdEntry> {
        if local_fd < 0 {
            return Err(FsError::FdOutOfRange);
        }
        let slot = self
            .slots
            .get_mut(local_fd as usize)
            .ok_or(FsError::FdOutOfRange)?;
        if !slot.in_use {
            return Err(FsError::FdNotInTable);
        }
        Ok(slot)
    }

    pub fn set(&mut self, local_fd: i32, entry: ProcessFdEntry) -> FsResult<()> {
        if local_fd < 0 {
            return Err(FsError::FdOutOfRange);
        }
        let slot = self
            .slots
            .get_mut(local_fd as usize)
            .ok_or(FsError::FdOutOfRange)?;
        *slot = entry;
        Ok(())
    }

    pub fn clear(&mut self, local_fd: i32) -> FsResult<ProcessFdEntry> {
        let slot = self.get_mut(local_fd)?;
        let old = *slot;
        *slot = ProcessFdEntry::default();
        Ok(old)
    }

    pub fn iter_in_use(&self) -> impl Iterator<Item = (i32, &ProcessFdEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.in_use)
            .map(|(i, s)| (i as i32, s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_release_frees_slot() {
        let mut table = GlobalFdTable::new();
        let idx = table.allocate(GlobalFdEntry {
            root_dir_slot: 0,
            offset: 0,
            ref_count: 1,
            write_lock: true,
            mode: OpenMode::Write,
        });
        assert_eq!(table.total_ref_count(), 1);
        let freed = table.release(idx).unwrap();
        assert!(freed);
        assert!(table.get(idx).is_err());
    }

    #[test]
    fn at_most_one_write_lock_per_dir_slot() {
        let mut table = GlobalFdTable::new();
        table.allocate(GlobalFdEntry {
            root_dir_slot: 3,
            offset: 0,
            ref_count: 1,
            write_lock: true,
            mode: OpenMode::Write,
        });
        assert_eq!(table.write_locked_count_for(3), 1);
    }

    #[test]
    fn std_streams_preloaded() {
        let table = ProcessFdTable::new_with_std_streams();
        assert!(table.get(STDIN_FD).is_ok());
        assert!(table.get(STDOUT_FD).is_ok());
        assert!(table.get(STDERR_FD).is_ok());
        assert!(table.get(3).is_err());
    }
}

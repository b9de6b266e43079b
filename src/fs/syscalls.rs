//! The FS syscall layer (spec.md §4.3/§4.4): translates per-process fds,
//! enforces the open-mode table and permissions, and keeps the
//! per-process cursor authoritative across calls.
//!
//! Grounded on the teacher's `syscalls::dispatch`'s `SYS_OPEN/SYS_READ/
//! SYS_WRITE/SYS_CLOSE` arms — copy a cursor in, perform the operation,
//! copy it back out — translated from the teacher's register-passed
//! syscall ABI to typed functions over `&mut Pcb`/`&Fs`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::fs::dentry::{DirEntry, EntryType, Perm};
use crate::fs::error::{FsError, FsResult};
use crate::fs::fd::{GlobalFdEntry, OpenMode, ProcessFdEntry, STDERR_FD, STDIN_FD, STDOUT_FD};
use crate::fs::Fs;
use crate::scheduler::pcb::Pcb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set = 1,
    Cur = 2,
    End = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChmodOp {
    Set = 0,
    Add = 1,
    Remove = 2,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// `s_open`: per the mode table in spec.md §4.3.
pub fn s_open(fs: &mut Fs, pcb: &mut Pcb, name: &str, mode: OpenMode) -> FsResult<i32> {
    let existing = fs.fat.lookup(name)?;

    let (slot, entry) = match (&existing, mode) {
        (Some((slot, entry)), OpenMode::Read) => (*slot, entry.clone()),
        (Some((slot, entry)), OpenMode::Write) => {
            if fs.global_fds.write_locked_count_for(*slot) > 0 {
                return Err(FsError::AlreadyWriteLocked);
            }
            fs.fat.truncate_to_one_block(entry.first_block)?;
            let mut updated = entry.clone();
            updated.size = 0;
            updated.mtime = now();
            fs.fat.write_entry(*slot, &updated)?;
            (*slot, updated)
        }
        (Some((slot, entry)), OpenMode::Append) => {
            if fs.global_fds.write_locked_count_for(*slot) > 0 {
                return Err(FsError::AlreadyWriteLocked);
            }
            (*slot, entry.clone())
        }
        (None, OpenMode::Read) => return Err(FsError::FileNotFound),
        (None, OpenMode::Write) | (None, OpenMode::Append) => {
            let (slot, entry, _block) = fs.fat.create(name, Perm::R | Perm::W, now())?;
            (slot, entry)
        }
    };

    if mode == OpenMode::Read && !entry.perm.contains(Perm::R) {
        return Err(FsError::WrongPermissions);
    }
    if (mode == OpenMode::Write || mode == OpenMode::Append) && !entry.perm.contains(Perm::W) {
        return Err(FsError::FileExistsReadonly);
    }

    let global_index = if mode == OpenMode::Read {
        match fs.global_fds.find_by_dir_slot(slot) {
            Some(idx) => fs.global_fds.share(idx)?,
            None => fs.global_fds.allocate(GlobalFdEntry {
                root_dir_slot: slot,
                offset: 0,
                ref_count: 1,
                write_lock: false,
                mode,
            }),
        }
    } else {
        fs.global_fds.allocate(GlobalFdEntry {
            root_dir_slot: slot,
            offset: if mode == OpenMode::Append {
                entry.size as u64
            } else {
                0
            },
            ref_count: 1,
            write_lock: true,
            mode,
        })
    };

    let local_fd = pcb.process_fd_table.find_free_slot()?;
    let local_offset = if mode == OpenMode::Append {
        entry.size as u64
    } else {
        0
    };
    pcb.process_fd_table.set(
        local_fd,
        ProcessFdEntry {
            in_use: true,
            global_fd_index: global_index,
            local_offset,
            mode,
        },
    )?;
    Ok(local_fd)
}

/// `s_close`: drop the local slot and the global reference it held.
pub fn s_close(fs: &mut Fs, pcb: &mut Pcb, fd: i32) -> FsResult<()> {
    let entry = pcb.process_fd_table.clear(fd)?;
    if fd == STDIN_FD || fd == STDOUT_FD || fd == STDERR_FD {
        return Ok(());
    }
    let freed = fs.global_fds.release(entry.global_fd_index)?;
    let _ = freed; // directory entry is flushed on every write already
    Ok(())
}

fn is_special_fd(fd: i32) -> bool {
    fd == STDIN_FD || fd == STDOUT_FD || fd == STDERR_FD
}

/// `s_read`.
pub fn s_read(fs: &mut Fs, pcb: &mut Pcb, fd: i32, buf: &mut [u8]) -> FsResult<usize> {
    if fd == STDIN_FD {
        use std::io::Read;
        return std::io::stdin().read(buf).map_err(|_| FsError::ReadFailed);
    }
    if is_special_fd(fd) {
        return Err(FsError::SpecialFd);
    }
    let local = *pcb.process_fd_table.get(fd)?;
    if local.mode != OpenMode::Read {
        return Err(FsError::WrongPermissions);
    }
    let global = fs.global_fds.get(local.global_fd_index)?;
    let entry = fs.fat.entry_at(global.root_dir_slot)?;
    let n = fs.fat.read_at(entry.first_block, local.local_offset, buf)?;
    let new_offset = local.local_offset + n as u64;
    fs.global_fds.get_mut(local.global_fd_index)?.offset = new_offset;
    pcb.process_fd_table.get_mut(fd)?.local_offset = new_offset;
    Ok(n)
}

/// `s_write`.
pub fn s_write(fs: &mut Fs, pcb: &mut Pcb, fd: i32, buf: &[u8]) -> FsResult<usize> {
    if is_special_fd(fd) {
        // stdout/stderr go straight to the host process; always succeeds.
        use std::io::Write;
        if fd == STDOUT_FD {
            let _ = std::io::stdout().write_all(buf);
        } else {
            let _ = std::io::stderr().write_all(buf);
        }
        return Ok(buf.len());
    }
    let local = *pcb.process_fd_table.get(fd)?;
    if local.mode != OpenMode::Write && local.mode != OpenMode::Append {
        return Err(FsError::WrongPermissions);
    }
    let global = fs.global_fds.get(local.global_fd_index)?;
    let slot = global.root_dir_slot;
    let mut entry = fs.fat.entry_at(slot)?;
    if !entry.perm.contains(Perm::W) {
        return Err(FsError::WrongPermissions);
    }
    let new_size = fs
        .fat
        .write_at(entry.first_block, entry.size, local.local_offset, buf)?;
    entry.size = new_size;
    entry.mtime = now();
    fs.fat.write_entry(slot, &entry)?;
    let new_offset = local.local_offset + buf.len() as u64;
    fs.global_fds.get_mut(local.global_fd_index)?.offset = new_offset;
    pcb.process_fd_table.get_mut(fd)?.local_offset = new_offset;
    Ok(buf.len())
}

/// `s_lseek`: special fds have no seekable cursor.
pub fn s_lseek(fs: &mut Fs, pcb: &mut Pcb, fd: i32, offset: i64, whence: Whence) -> FsResult<u64> {
    if is_special_fd(fd) {
        return Err(FsError::SpecialFd);
    }
    let local = *pcb.process_fd_table.get(fd)?;
    let global = fs.global_fds.get(local.global_fd_index)?;
    let entry = fs.fat.entry_at(global.root_dir_slot)?;
    let base: i64 = match whence {
        Whence::Set => 0,
        Whence::Cur => local.local_offset as i64,
        Whence::End => entry.size as i64,
    };
    let new_offset = base
        .checked_add(offset)
        .filter(|v| *v >= 0)
        .ok_or(FsError::SeekOutOfRange)?;
    pcb.process_fd_table.get_mut(fd)?.local_offset = new_offset as u64;
    fs.global_fds.get_mut(local.global_fd_index)?.offset = new_offset as u64;
    Ok(new_offset as u64)
}

/// `s_unlink`: fails if any global FD entry still references the file.
pub fn s_unlink(fs: &mut Fs, name: &str) -> FsResult<()> {
    let (slot, entry) = fs.fat.lookup(name)?.ok_or(FsError::FileNotFound)?;
    if fs.global_fds.find_by_dir_slot(slot).is_some() {
        return Err(FsError::AlreadyWriteLocked);
    }
    fs.fat.unlink(slot, entry.first_block)
}

/// `s_chmod`: `SET/ADD/REMOVE` applied to `R/W/X`, enforcing `X` implies `R`.
pub fn s_chmod(fs: &mut Fs, name: &str, op: ChmodOp, bits: Perm) -> FsResult<()> {
    let (slot, mut entry) = fs.fat.lookup(name)?.ok_or(FsError::FileNotFound)?;
    let new_perm = match op {
        ChmodOp::Set => bits,
        ChmodOp::Add => entry.perm | bits,
        ChmodOp::Remove => entry.perm & !bits,
    };
    if !new_perm.is_valid() {
        return Err(FsError::BadMode);
    }
    entry.perm = new_perm;
    fs.fat.write_entry(slot, &entry)
}

/// `s_mv`: same-directory rename; fails if the destination already exists.
pub fn s_mv(fs: &mut Fs, src: &str, dst: &str) -> FsResult<()> {
    if dst.is_empty() || dst.len() >= crate::fs::dentry::NAME_LEN || dst.contains('/') {
        return Err(FsError::InvalidFilename);
    }
    let (slot, mut entry) = fs.fat.lookup(src)?.ok_or(FsError::FileNotFound)?;
    if fs.fat.lookup(dst)?.is_some() {
        return Err(FsError::InvalidFilename);
    }
    entry.name = dst.to_string();
    fs.fat.write_entry(slot, &entry)
}

/// `s_ls`: `perm-string size mtime name` for every live entry.
pub fn s_ls(fs: &Fs) -> FsResult<String> {
    let mut out = String::new();
    for entry in fs.fat.list()? {
        out.push_str(&format!(
            "{}{} {} {} {}\n",
            match entry.entry_type {
                EntryType::Directory => "d",
                EntryType::Regular => "-",
            },
            entry.perm.as_rwx(),
            entry.size,
            entry.mtime,
            entry.name,
        ));
    }
    Ok(out)
}

/// `s_fprintf_short`: write a pre-formatted string to a local fd, the
/// thin helper the shell uses instead of formatting at the call site.
pub fn s_fprintf_short(fs: &mut Fs, pcb: &mut Pcb, fd: i32, s: &str) -> FsResult<usize> {
    s_write(fs, pcb, fd, s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fd::ProcessFdTable;
    use std::io::Write as _;

    fn fresh_fs() -> (tempfile::NamedTempFile, Fs) {
        let geometry = crate::fs::fat::Geometry::new(1, 0).unwrap();
        let block_size = geometry.block_size() as usize;
        let data_block_count = geometry.data_block_count() as usize;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut fat = vec![0u8; geometry.fat_region_size() as usize];
        fat[0..2].copy_from_slice(&geometry.to_entry().to_le_bytes());
        fat[2..4].copy_from_slice(&crate::fs::fat::FAT_EOC.to_le_bytes());
        file.write_all(&fat).unwrap();
        file.write_all(&vec![0u8; block_size * data_block_count])
            .unwrap();
        file.flush().unwrap();
        let fs = Fs::mount(file.path()).unwrap();
        (file, fs)
    }

    fn fresh_pcb() -> Pcb {
        Pcb::new(
            2,
            1,
            2,
            true,
            crate::scheduler::pcb::Priority::Medium,
            "test".to_string(),
            vec![],
            ProcessFdTable::new_with_std_streams(),
        )
    }

    #[test]
    fn write_then_read_round_trips() {
        let (_tmp, mut fs) = fresh_fs();
        let mut pcb = fresh_pcb();
        let fd = s_open(&mut fs, &mut pcb, "a", OpenMode::Write).unwrap();
        let n = s_write(&mut fs, &mut pcb, fd, b"hello world").unwrap();
        assert_eq!(n, 11);
        s_lseek(&mut fs, &mut pcb, fd, 0, Whence::Set).unwrap();
        let mut buf = [0u8; 32];
        let read = s_read(&mut fs, &mut pcb, fd, &mut buf).unwrap();
        assert_eq!(&buf[..read], b"hello world");
        s_close(&mut fs, &mut pcb, fd).unwrap();
        let listing = s_ls(&fs).unwrap();
        assert!(listing.contains("a"));
        assert!(listing.contains("11"));
    }

    #[test]
    fn second_writer_is_rejected_until_first_closes() {
        let (_tmp, mut fs) = fresh_fs();
        let mut p1 = fresh_pcb();
        let mut p2 = fresh_pcb();
        p2.pid = 3;
        let fd1 = s_open(&mut fs, &mut p1, "f", OpenMode::Write).unwrap();
        let err = s_open(&mut fs, &mut p2, "f", OpenMode::Write).unwrap_err();
        assert_eq!(err, FsError::AlreadyWriteLocked);
        s_close(&mut fs, &mut p1, fd1).unwrap();
        assert!(s_open(&mut fs, &mut p2, "f", OpenMode::Write).is_ok());
    }

    #[test]
    fn chmod_idempotent_set() {
        let (_tmp, mut fs) = fresh_fs();
        let mut pcb = fresh_pcb();
        let fd = s_open(&mut fs, &mut pcb, "a", OpenMode::Write).unwrap();
        s_close(&mut fs, &mut pcb, fd).unwrap();
        s_chmod(&mut fs, "a", ChmodOp::Set, Perm::R).unwrap();
        let (_, first) = fs.fat.lookup("a").unwrap().unwrap();
        s_chmod(&mut fs, "a", ChmodOp::Set, Perm::R).unwrap();
        let (_, second) = fs.fat.lookup("a").unwrap().unwrap();
        assert_eq!(first.perm, second.perm);
    }
}

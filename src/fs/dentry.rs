//! The 64-byte packed directory entry (spec.md §3/§6).
//!
//! Grounded on the teacher's `RawDirEntry` in `fs::fat32::fat32` (a
//! fixed-size, byte-packed on-disk record with `from_bytes`/`to_bytes`
//! and `first_cluster`/`is_free` helpers) generalized from FAT32's 32-byte
//! 8.3 record to this spec's 64-byte `name[32] || size:u32 ||
//! first_block:u16 || type:u8 || perm:u8 || mtime:i64 || padding[16]`
//! layout.

use bitflags::bitflags;

pub const DIR_ENTRY_SIZE: usize = 64;
pub const NAME_LEN: usize = 32;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u8 {
        const R = 0b100;
        const W = 0b010;
        const X = 0b001;
    }
}

impl Perm {
    /// `X` requires `R`; an otherwise-valid bit pattern missing `R` but
    /// carrying `X` is not representable.
    pub fn is_valid(&self) -> bool {
        !(self.contains(Perm::X) && !self.contains(Perm::R))
    }

    /// `rwx`-style three-character rendering used by `ls`.
    pub fn as_rwx(&self) -> String {
        format!(
            "{}{}{}",
            if self.contains(Perm::R) { "r" } else { "-" },
            if self.contains(Perm::W) { "w" } else { "-" },
            if self.contains(Perm::X) { "x" } else { "-" },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryType {
    Regular = 0,
    Directory = 1,
}

/// One 64-byte directory record. `name[0] == 0` marks a free slot.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub size: u32,
    pub first_block: u16,
    pub entry_type: EntryType,
    pub perm: Perm,
    pub mtime: i64,
}

impl DirEntry {
    pub fn is_free(&self) -> bool {
        self.name.is_empty() || self.name.as_bytes()[0] == 0
    }

    pub fn free() -> Self {
        DirEntry {
            name: String::new(),
            size: 0,
            first_block: 0,
            entry_type: EntryType::Regular,
            perm: Perm::empty(),
            mtime: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        let name_bytes = self.name.as_bytes();
        let n = name_bytes.len().min(NAME_LEN - 1);
        buf[..n].copy_from_slice(&name_bytes[..n]);
        buf[NAME_LEN..NAME_LEN + 4].copy_from_slice(&self.size.to_le_bytes());
        buf[NAME_LEN + 4..NAME_LEN + 6].copy_from_slice(&self.first_block.to_le_bytes());
        buf[NAME_LEN + 6] = self.entry_type as u8;
        buf[NAME_LEN + 7] = self.perm.bits();
        buf[NAME_LEN + 8..NAME_LEN + 16].copy_from_slice(&self.mtime.to_le_bytes());
        // remaining 16 bytes are zero padding
        buf
    }

    pub fn from_bytes(buf: &[u8; DIR_ENTRY_SIZE]) -> Self {
        let name_end = buf[..NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&buf[..name_end]).into_owned();
        let size = u32::from_le_bytes(buf[NAME_LEN..NAME_LEN + 4].try_into().unwrap());
        let first_block =
            u16::from_le_bytes(buf[NAME_LEN + 4..NAME_LEN + 6].try_into().unwrap());
        let entry_type = if buf[NAME_LEN + 6] == EntryType::Directory as u8 {
            EntryType::Directory
        } else {
            EntryType::Regular
        };
        let perm = Perm::from_bits_truncate(buf[NAME_LEN + 7]);
        let mtime = i64::from_le_bytes(buf[NAME_LEN + 8..NAME_LEN + 16].try_into().unwrap());
        DirEntry {
            name,
            size,
            first_block,
            entry_type,
            perm,
            mtime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let entry = DirEntry {
            name: "hello.txt".to_string(),
            size: 11,
            first_block: 3,
            entry_type: EntryType::Regular,
            perm: Perm::R | Perm::W,
            mtime: 1_700_000_000,
        };
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), DIR_ENTRY_SIZE);
        let back = DirEntry::from_bytes(&bytes);
        assert_eq!(back.name, entry.name);
        assert_eq!(back.size, entry.size);
        assert_eq!(back.first_block, entry.first_block);
        assert_eq!(back.perm, entry.perm);
        assert_eq!(back.mtime, entry.mtime);
    }

    #[test]
    fn x_without_r_is_invalid() {
        assert!(!(Perm::X).is_valid());
        assert!((Perm::R | Perm::X).is_valid());
    }

    #[test]
    fn free_slot_detected_by_nul_name() {
        assert!(DirEntry::free().is_free());
    }
}

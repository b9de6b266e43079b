//! The FAT16-style filesystem core (spec.md §4.3/§6).
//!
//! Grounded directly on the teacher's `fs::fat32::Fat32Fs`: a geometry
//! struct parsed from the image header, a `Mutex`-guarded inner state,
//! and chain-walking helpers (`read_chain`/`write_chain`/`alloc_cluster`/
//! `read_dir_entries`). ATA sector I/O (`PRIMARY_ATA.lock()`,
//! `read_sector_raw`/`write_sector_raw`) is replaced by `std::fs::File`
//! `seek`+`read_exact`/`write_all` against the image path, and FAT32's
//! 32-bit cluster chain is replaced by this spec's 16-bit block-chain and
//! geometry-byte encoding.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::fs::dentry::{DirEntry, DIR_ENTRY_SIZE};
use crate::fs::error::{FsError, FsResult};

pub const FAT_FREE: u16 = 0x0000;
pub const FAT_EOC: u16 = 0xFFFF;

pub const ROOT_DIR_FIRST_BLOCK: u16 = 1;

/// Geometry encoded in FAT entry 0: `(blocks_in_fat << 8) |
/// block_size_config`.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    pub blocks_in_fat: u8,
    pub block_size_config: u8,
}

impl Geometry {
    pub fn new(blocks_in_fat: u8, block_size_config: u8) -> FsResult<Self> {
        if !(1..=32).contains(&blocks_in_fat) || block_size_config > 4 {
            return Err(FsError::InvalidFilename);
        }
        Ok(Geometry {
            blocks_in_fat,
            block_size_config,
        })
    }

    pub fn from_entry(entry0: u16) -> FsResult<Self> {
        Geometry::new((entry0 >> 8) as u8, (entry0 & 0xFF) as u8)
    }

    pub fn to_entry(&self) -> u16 {
        ((self.blocks_in_fat as u16) << 8) | self.block_size_config as u16
    }

    pub fn block_size(&self) -> u32 {
        match self.block_size_config {
            0 => 256,
            1 => 512,
            2 => 1024,
            3 => 2048,
            4 => 4096,
            _ => unreachable!("validated in `new`"),
        }
    }

    /// Byte size of the FAT region.
    pub fn fat_region_size(&self) -> u64 {
        self.blocks_in_fat as u64 * self.block_size() as u64
    }

    /// Number of 2-byte FAT entries, including the reserved entries 0/1.
    pub fn fat_entry_count(&self) -> u32 {
        (self.fat_region_size() / 2) as u32
    }

    /// Number of usable data blocks, indexed `1..=data_block_count`.
    pub fn data_block_count(&self) -> u32 {
        if self.block_size_config == 4 {
            self.fat_entry_count() - 2
        } else {
            self.fat_entry_count() - 1
        }
    }

    pub fn entries_per_block(&self) -> u32 {
        self.block_size() / DIR_ENTRY_SIZE as u32
    }

    fn data_region_start(&self) -> u64 {
        self.fat_region_size()
    }
}

struct Inner {
    file: File,
    geometry: Geometry,
}

impl Inner {
    fn fat_entry_offset(&self, index: u32) -> u64 {
        index as u64 * 2
    }

    fn block_offset(&self, block: u16) -> u64 {
        self.geometry.data_region_start() + (block as u64 - 1) * self.geometry.block_size() as u64
    }

    fn read_fat_entry(&mut self, index: u32) -> FsResult<u16> {
        let mut buf = [0u8; 2];
        self.file
            .seek(SeekFrom::Start(self.fat_entry_offset(index)))
            .map_err(|_| FsError::ReadFailed)?;
        self.file
            .read_exact(&mut buf)
            .map_err(|_| FsError::ReadFailed)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn write_fat_entry(&mut self, index: u32, value: u16) -> FsResult<()> {
        self.file
            .seek(SeekFrom::Start(self.fat_entry_offset(index)))
            .map_err(|_| FsError::WriteFailed)?;
        self.file
            .write_all(&value.to_le_bytes())
            .map_err(|_| FsError::WriteFailed)?;
        Ok(())
    }

    fn read_block(&mut self, block: u16, buf: &mut [u8]) -> FsResult<()> {
        self.file
            .seek(SeekFrom::Start(self.block_offset(block)))
            .map_err(|_| FsError::ReadFailed)?;
        self.file.read_exact(buf).map_err(|_| FsError::ReadFailed)
    }

    fn write_block(&mut self, block: u16, buf: &[u8]) -> FsResult<()> {
        self.file
            .seek(SeekFrom::Start(self.block_offset(block)))
            .map_err(|_| FsError::WriteFailed)?;
        self.file.write_all(buf).map_err(|_| FsError::WriteFailed)
    }

    /// Blocks of a chain starting at `start`, stopping before `0xFFFF`.
    fn chain_blocks(&mut self, start: u16) -> FsResult<Vec<u16>> {
        let mut blocks = Vec::new();
        let mut current = start;
        loop {
            blocks.push(current);
            let next = self.read_fat_entry(current as u32)?;
            if next == FAT_EOC {
                break;
            }
            if next == FAT_FREE {
                // A 0x0000 before the terminator violates the FAT-chain
                // invariant; treat as an unrecoverable corruption.
                return Err(FsError::ReadFailed);
            }
            current = next;
        }
        Ok(blocks)
    }

    /// Linear scan for the first free entry (spec.md §4.3: "every
    /// allocation is O(N) over the FAT").
    fn find_free_block(&mut self) -> FsResult<u16> {
        let limit = self.geometry.data_block_count();
        for candidate in 2..=limit as u16 {
            if self.read_fat_entry(candidate as u32)? == FAT_FREE {
                return Ok(candidate);
            }
        }
        Err(FsError::NoEmptyBlocks)
    }

    /// Allocate a free block, zero it, and link it to the end of `tail`.
    fn alloc_and_link(&mut self, tail: u16) -> FsResult<u16> {
        let new_block = self.find_free_block()?;
        self.write_fat_entry(new_block as u32, FAT_EOC)?;
        self.write_fat_entry(tail as u32, new_block)?;
        let zeros = vec![0u8; self.geometry.block_size() as usize];
        self.write_block(new_block, &zeros)?;
        Ok(new_block)
    }

    /// Free every block in a chain back to `0x0000`.
    fn free_chain(&mut self, start: u16) -> FsResult<()> {
        let mut current = start;
        loop {
            let next = self.read_fat_entry(current as u32)?;
            self.write_fat_entry(current as u32, FAT_FREE)?;
            if next == FAT_EOC {
                break;
            }
            current = next;
        }
        Ok(())
    }

    /// Truncate a chain to its first block, freeing the rest, and mark
    /// that first block as the new terminator.
    fn truncate_to_one_block(&mut self, start: u16) -> FsResult<()> {
        let next = self.read_fat_entry(start as u32)?;
        if next != FAT_EOC {
            self.free_chain(next)?;
        }
        self.write_fat_entry(start as u32, FAT_EOC)?;
        let zeros = vec![0u8; self.geometry.block_size() as usize];
        self.write_block(start, &zeros)
    }

    fn root_chain_blocks(&mut self) -> FsResult<Vec<u16>> {
        self.chain_blocks(ROOT_DIR_FIRST_BLOCK)
    }

    /// All directory slots, in on-disk order, as `(slot_index, entry)`.
    fn read_dir_entries(&mut self) -> FsResult<Vec<(usize, DirEntry)>> {
        let blocks = self.root_chain_blocks()?;
        let per_block = self.geometry.entries_per_block() as usize;
        let block_size = self.geometry.block_size() as usize;
        let mut out = Vec::new();
        for (block_pos, block) in blocks.iter().enumerate() {
            let mut buf = vec![0u8; block_size];
            self.read_block(*block, &mut buf)?;
            for i in 0..per_block {
                let start = i * DIR_ENTRY_SIZE;
                let mut raw = [0u8; DIR_ENTRY_SIZE];
                raw.copy_from_slice(&buf[start..start + DIR_ENTRY_SIZE]);
                let entry = DirEntry::from_bytes(&raw);
                out.push((block_pos * per_block + i, entry));
            }
        }
        Ok(out)
    }

    fn slot_location(&self, slot: usize) -> (usize, usize) {
        let per_block = self.geometry.entries_per_block() as usize;
        (slot / per_block, slot % per_block)
    }

    fn write_dir_entry(&mut self, slot: usize, entry: &DirEntry) -> FsResult<()> {
        let blocks = self.root_chain_blocks()?;
        let (block_pos, in_block) = self.slot_location(slot);
        let block = *blocks.get(block_pos).ok_or(FsError::InvalidFilename)?;
        let block_size = self.geometry.block_size() as usize;
        let mut buf = vec![0u8; block_size];
        self.read_block(block, &mut buf)?;
        let start = in_block * DIR_ENTRY_SIZE;
        buf[start..start + DIR_ENTRY_SIZE].copy_from_slice(&entry.to_bytes());
        self.write_block(block, &buf)
    }

    /// Find a free slot for a new entry, extending the root-directory
    /// chain with a freshly allocated block if the existing chain has no
    /// free slots.
    fn find_or_extend_free_slot(&mut self) -> FsResult<usize> {
        let entries = self.read_dir_entries()?;
        if let Some((slot, _)) = entries.iter().find(|(_, e)| e.is_free()) {
            return Ok(*slot);
        }
        let blocks = self.root_chain_blocks()?;
        let tail = *blocks.last().ok_or(FsError::InvalidFilename)?;
        self.alloc_and_link(tail)?;
        let per_block = self.geometry.entries_per_block() as usize;
        Ok(blocks.len() * per_block)
    }
}

/// The mounted FAT16 image.
pub struct FatFs {
    inner: Mutex<Inner>,
}

impl FatFs {
    /// Open the image file and parse its geometry (entry 0).
    pub fn mount(path: impl AsRef<Path>) -> FsResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|_| FsError::FileNotFound)?;
        let mut buf = [0u8; 2];
        file.seek(SeekFrom::Start(0))
            .map_err(|_| FsError::ReadFailed)?;
        file.read_exact(&mut buf).map_err(|_| FsError::ReadFailed)?;
        let geometry = Geometry::from_entry(u16::from_le_bytes(buf))?;
        Ok(FatFs {
            inner: Mutex::new(Inner { file, geometry }),
        })
    }

    /// Unmounts by dropping the handle; the file is closed when `self`
    /// is dropped.
    pub fn unmount(self) {}

    pub fn geometry(&self) -> Geometry {
        self.inner.lock().unwrap().geometry
    }

    pub fn block_size(&self) -> u32 {
        self.geometry().block_size()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn lookup(&self, name: &str) -> FsResult<Option<(usize, DirEntry)>> {
        let entries = self.lock().read_dir_entries()?;
        Ok(entries
            .into_iter()
            .find(|(_, e)| !e.is_free() && e.name == name))
    }

    pub fn list(&self) -> FsResult<Vec<DirEntry>> {
        let entries = self.lock().read_dir_entries()?;
        Ok(entries
            .into_iter()
            .filter(|(_, e)| !e.is_free())
            .map(|(_, e)| e)
            .collect())
    }

    pub fn entry_at(&self, slot: usize) -> FsResult<DirEntry> {
        let entries = self.lock().read_dir_entries()?;
        entries
            .into_iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, e)| e)
            .ok_or(FsError::FileNotFound)
    }

    pub fn write_entry(&self, slot: usize, entry: &DirEntry) -> FsResult<()> {
        self.lock().write_dir_entry(slot, entry)
    }

    /// Create a new, empty (one-block) directory entry for `name`.
    pub fn create(&self, name: &str, perm: crate::fs::dentry::Perm, mtime: i64) -> FsResult<(usize, DirEntry, u16)> {
        if name.is_empty() || name.len() >= crate::fs::dentry::NAME_LEN || name.contains('/') {
            return Err(FsError::InvalidFilename);
        }
        let mut inner = self.lock();
        let slot = inner.find_or_extend_free_slot()?;
        let block = inner.find_free_block()?;
        inner.write_fat_entry(block as u32, FAT_EOC)?;
        let block_size = inner.geometry.block_size() as usize;
        inner.write_block(block, &vec![0u8; block_size])?;
        let entry = DirEntry {
            name: name.to_string(),
            size: 0,
            first_block: block,
            entry_type: crate::fs::dentry::EntryType::Regular,
            perm,
            mtime,
        };
        inner.write_dir_entry(slot, &entry)?;
        Ok((slot, entry, block))
    }

    pub fn truncate_to_one_block(&self, first_block: u16) -> FsResult<()> {
        self.lock().truncate_to_one_block(first_block)
    }

    /// Read `len` bytes from `first_block`'s chain starting at `offset`.
    pub fn read_at(&self, first_block: u16, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let mut inner = self.lock();
        let block_size = inner.geometry.block_size() as u64;
        let blocks = inner.chain_blocks(first_block)?;
        let mut read = 0usize;
        let mut pos = offset;
        while read < buf.len() {
            let block_index = (pos / block_size) as usize;
            let Some(&block) = blocks.get(block_index) else {
                break;
            };
            let in_block = (pos % block_size) as usize;
            let mut block_buf = vec![0u8; block_size as usize];
            inner.read_block(block, &mut block_buf)?;
            let available = block_size as usize - in_block;
            let want = (buf.len() - read).min(available);
            buf[read..read + want].copy_from_slice(&block_buf[in_block..in_block + want]);
            read += want;
            pos += want as u64;
        }
        Ok(read)
    }

    /// Write `data` to `first_block`'s chain starting at `offset`,
    /// allocating new blocks as the chain's tail is crossed. Returns the
    /// new size if it grew past `current_size`.
    pub fn write_at(
        &self,
        first_block: u16,
        current_size: u32,
        offset: u64,
        data: &[u8],
    ) -> FsResult<u32> {
        let mut inner = self.lock();
        let block_size = inner.geometry.block_size() as u64;
        let mut blocks = inner.chain_blocks(first_block)?;
        let mut written = 0usize;
        let mut pos = offset;
        while written < data.len() {
            let block_index = (pos / block_size) as usize;
            while block_index >= blocks.len() {
                let tail = *blocks.last().unwrap();
                let new_block = inner.alloc_and_link(tail)?;
                blocks.push(new_block);
            }
            let block = blocks[block_index];
            let in_block = (pos % block_size) as usize;
            let mut block_buf = vec![0u8; block_size as usize];
            inner.read_block(block, &mut block_buf)?;
            let space = block_size as usize - in_block;
            let want = (data.len() - written).min(space);
            block_buf[in_block..in_block + want].copy_from_slice(&data[written..written + want]);
            inner.write_block(block, &block_buf)?;
            written += want;
            pos += want as u64;
        }
        Ok(current_size.max((offset + data.len() as u64) as u32))
    }

    /// Free every block in `first_block`'s chain and zero the entry's
    /// name, provided no global FD entry still references it (checked by
    /// the caller).
    pub fn unlink(&self, slot: usize, first_block: u16) -> FsResult<()> {
        let mut inner = self.lock();
        inner.free_chain(first_block)?;
        inner.write_dir_entry(slot, &DirEntry::free())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::dentry::Perm;
    use std::io::Write as _;

    fn fresh_image(blocks_in_fat: u8, block_size_config: u8) -> tempfile::NamedTempFile {
        let geometry = Geometry::new(blocks_in_fat, block_size_config).unwrap();
        let block_size = geometry.block_size() as usize;
        let fat_region_size = geometry.fat_region_size() as usize;
        let data_block_count = geometry.data_block_count() as usize;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut fat = vec![0u8; fat_region_size];
        fat[0..2].copy_from_slice(&geometry.to_entry().to_le_bytes());
        fat[2..4].copy_from_slice(&FAT_EOC.to_le_bytes());
        file.write_all(&fat).unwrap();
        file.write_all(&vec![0u8; block_size * data_block_count]).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn geometry_round_trips() {
        let g = Geometry::new(1, 0).unwrap();
        assert_eq!(Geometry::from_entry(g.to_entry()).unwrap().block_size(), 256);
    }

    #[test]
    fn create_write_read_round_trip() {
        let image = fresh_image(1, 0);
        let fs = FatFs::mount(image.path()).unwrap();
        let (slot, entry, block) = fs.create("a", Perm::R | Perm::W, 0).unwrap();
        assert_eq!(entry.first_block, block);
        let data = b"hello world";
        let new_size = fs.write_at(block, 0, 0, data).unwrap();
        assert_eq!(new_size as usize, data.len());
        let mut buf = [0u8; 32];
        let n = fs.read_at(block, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n.min(data.len())], data);
        let listed = fs.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a");
        let _ = slot;
    }

    #[test]
    fn unlink_frees_chain() {
        let image = fresh_image(1, 0);
        let fs = FatFs::mount(image.path()).unwrap();
        let (slot, _entry, block) = fs.create("f", Perm::R | Perm::W, 0).unwrap();
        fs.unlink(slot, block).unwrap();
        assert!(fs.lookup("f").unwrap().is_none());
        let free_block = fs.lock().find_free_block().unwrap();
        assert_eq!(free_block, block);
    }
}

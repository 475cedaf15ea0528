//! Shared slot-allocation discipline used by all three engines.
//!
//! Every backing file is an array of fixed-size slots addressed by a
//! 0-based index. `alloc` computes `pos = file_size / slot_size`, writes a
//! zero-filled slot at `pos * slot_size`, and returns `pos`. Growth is
//! therefore always monotonic, contiguous and gap-free, and any slot index
//! in range either holds real data or reads back as a zeroed sentinel that
//! callers interpret as "empty".

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::Result;

/// A file viewed as an array of fixed-size slots.
pub(crate) struct SlotFile {
    file: File,
    slot_size: usize,
}

impl SlotFile {
    /// Open `path` for reading and writing, creating it (empty) if absent.
    pub(crate) fn open(path: impl AsRef<Path>, slot_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(SlotFile { file, slot_size })
    }

    pub(crate) fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of whole slots currently in the file (a trailing short slot,
    /// which should never happen under this module's own discipline, is
    /// ignored rather than rounded up).
    pub(crate) fn slot_count(&mut self) -> Result<u64> {
        let len = self.file.seek(SeekFrom::End(0))?;
        Ok(len / self.slot_size as u64)
    }

    /// Append a zero-filled slot at end-of-file and return its index.
    pub(crate) fn alloc(&mut self) -> Result<u64> {
        let pos = self.slot_count()?;
        self.write_slot(pos, &vec![0u8; self.slot_size])?;
        Ok(pos)
    }

    /// Read slot `pos` into a freshly allocated buffer. Returns `None` if
    /// the slot is entirely beyond end-of-file (lazy growth: an
    /// unallocated slot reads as "no slot" rather than an error), and a
    /// partially-short read is zero-padded so callers always get a
    /// full-width buffer to decode.
    pub(crate) fn read_slot(&mut self, pos: u64) -> Result<Option<Vec<u8>>> {
        let offset = pos * self.slot_size as u64;
        if self.file.seek(SeekFrom::End(0))? <= offset {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; self.slot_size];
        let mut read_so_far = 0usize;
        loop {
            let n = self.file.read(&mut buf[read_so_far..])?;
            if n == 0 {
                break;
            }
            read_so_far += n;
            if read_so_far == buf.len() {
                break;
            }
        }
        Ok(Some(buf))
    }

    /// Overwrite slot `pos` wholesale. `data.len()` must equal `slot_size`.
    pub(crate) fn write_slot(&mut self, pos: u64, data: &[u8]) -> Result<()> {
        debug_assert_eq!(data.len(), self.slot_size);
        let offset = pos * self.slot_size as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_monotonic_and_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let mut sf = SlotFile::open(dir.path().join("slots"), 16).unwrap();
        assert_eq!(sf.alloc().unwrap(), 0);
        assert_eq!(sf.alloc().unwrap(), 1);
        assert_eq!(sf.alloc().unwrap(), 2);
        assert_eq!(sf.slot_count().unwrap(), 3);
    }

    #[test]
    fn unallocated_slot_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut sf = SlotFile::open(dir.path().join("slots"), 16).unwrap();
        sf.alloc().unwrap();
        assert!(sf.read_slot(5).unwrap().is_none());
    }

    #[test]
    fn written_slot_reads_back_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let mut sf = SlotFile::open(dir.path().join("slots"), 8).unwrap();
        let pos = sf.alloc().unwrap();
        sf.write_slot(pos, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(sf.read_slot(pos).unwrap().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn allocated_but_unwritten_slot_is_zeroed() {
        let dir = tempfile::tempdir().unwrap();
        let mut sf = SlotFile::open(dir.path().join("slots"), 4).unwrap();
        let pos = sf.alloc().unwrap();
        assert_eq!(sf.read_slot(pos).unwrap().unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn reopening_an_existing_file_preserves_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slots");
        {
            let mut sf = SlotFile::open(&path, 4).unwrap();
            let pos = sf.alloc().unwrap();
            sf.write_slot(pos, &[9, 9, 9, 9]).unwrap();
        }
        let mut sf = SlotFile::open(&path, 4).unwrap();
        assert_eq!(sf.slot_count().unwrap(), 1);
        assert_eq!(sf.read_slot(0).unwrap().unwrap(), vec![9, 9, 9, 9]);
    }
}

//! Sequential File: a sorted main file plus a small sorted auxiliary file
//! that absorbs inserts, reconciled by an O(N+K) merge-reconstruction once
//! the auxiliary file grows past a size-derived threshold.
//!
//! Unlike the B+Tree and Extendible Hashing engines, this one does not use
//! the shared `SlotFile` append-allocator: both files are routinely
//! rewritten wholesale (sort-and-rewrite on insert/delete, merge-and-rewrite
//! on reconstruction), so there is no stable slot index worth allocating.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;

use crate::config::SeqFilePaths;
use crate::error::Result;
use crate::record::Record;

pub struct SequentialFile<T: Record> {
    main: File,
    aux: File,
    main_record_size: usize,
    k_threshold: u64,
    _marker: PhantomData<T>,
}

impl<T: Record> SequentialFile<T> {
    pub fn open(paths: &SeqFilePaths) -> Result<Self> {
        let main = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&paths.main_file)?;
        let aux = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&paths.aux_file)?;
        Ok(SequentialFile {
            main,
            aux,
            main_record_size: T::RECORD_SIZE + 1,
            k_threshold: 10,
            _marker: PhantomData,
        })
    }

    /// Flush both file handles. Dropping a `SequentialFile` does this
    /// automatically; call it directly when a caller wants a guaranteed
    /// sync point before, say, copying the backing files.
    pub fn close(&mut self) -> Result<()> {
        self.main.flush()?;
        self.aux.flush()?;
        Ok(())
    }

    // ---------------- Public API ----------------

    /// Insert-or-update into the auxiliary file, keeping it sorted by key.
    /// A key already present in aux is overwritten in place rather than
    /// appended again, the same upsert discipline `btree.rs`'s
    /// `data_page_upsert` and `hashing.rs`'s bucket-chain insert use.
    /// Unlike the B+Tree and hashing engines, an empty key is accepted
    /// here: the sequential file has no structural reason to special-case it.
    pub fn add(&mut self, record: T) -> Result<()> {
        let mut aux_records = self.read_all_aux()?;
        let key = record.primary_key();
        match aux_records.iter().position(|r| r.primary_key() == key) {
            Some(idx) => aux_records[idx] = record,
            None => {
                aux_records.push(record);
                aux_records.sort_by(|a, b| a.primary_key().cmp(&b.primary_key()));
            }
        }
        self.write_all_aux(&aux_records)?;

        if aux_records.len() as u64 > self.k_threshold {
            log::info!(
                "seqfile: aux threshold k={} exceeded ({} records), reconstructing",
                self.k_threshold,
                aux_records.len()
            );
            self.reconstruct()?;
        }
        Ok(())
    }

    pub fn search(&mut self, key: &str) -> Result<Option<T>> {
        if let Some((record, deleted)) = self.binary_search_main(key)? {
            return Ok(if deleted { None } else { Some(record) });
        }
        self.binary_search_aux(key)
    }

    pub fn range_search(&mut self, begin_key: &str, end_key: &str) -> Result<Vec<T>> {
        let mut main_results = Vec::new();
        if let Some(start_pos) = self.find_first_in_range(begin_key)? {
            let count = self.count_main()?;
            for pos in start_pos..count {
                let (record, deleted) = self.read_main_record(pos)?;
                if record.primary_key().as_str() > end_key {
                    break;
                }
                if !deleted {
                    main_results.push(record);
                }
            }
        }
        let aux_results: Vec<T> = self
            .read_all_aux()?
            .into_iter()
            .filter(|r| {
                let k = r.primary_key();
                k.as_str() >= begin_key && k.as_str() <= end_key
            })
            .collect();
        Ok(Self::merge_lists(main_results, aux_results))
    }

    /// Physical delete in the auxiliary file if present there, else a
    /// logical tombstone in the main file.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        let aux_records = self.read_all_aux()?;
        if aux_records.iter().any(|r| r.primary_key() == key) {
            let filtered: Vec<T> = aux_records
                .into_iter()
                .filter(|r| r.primary_key() != key)
                .collect();
            self.write_all_aux(&filtered)?;
            return Ok(true);
        }

        if let Some(pos) = self.find_record_pos(key)? {
            let (_, deleted) = self.read_main_record(pos)?;
            if !deleted {
                self.write_tombstone(pos)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Initial load: sorts `records` and writes them as the main file,
    /// clears the auxiliary file, and derives a fresh threshold
    /// `k = max(10, floor(log2(n)))`.
    pub fn bulk_load(&mut self, mut records: Vec<T>) -> Result<()> {
        records.sort_by(|a, b| a.primary_key().cmp(&b.primary_key()));
        self.write_all_main(&records)?;
        self.aux.set_len(0)?;
        self.aux.seek(SeekFrom::Start(0))?;
        self.aux.flush()?;

        let n = records.len() as u64;
        if n > 0 {
            let log2n = (n as f64).log2().floor() as u64;
            self.k_threshold = log2n.max(10);
        }
        log::info!(
            "seqfile: bulk load complete, {n} records, k threshold {}",
            self.k_threshold
        );
        Ok(())
    }

    fn reconstruct(&mut self) -> Result<()> {
        let main_live: Vec<T> = self
            .read_all_main()?
            .into_iter()
            .filter_map(|(r, deleted)| if deleted { None } else { Some(r) })
            .collect();
        let aux_records = self.read_all_aux()?;
        log::info!(
            "seqfile: reconstructing from {} live main + {} aux records",
            main_live.len(),
            aux_records.len()
        );
        let merged = Self::merge_lists(main_live, aux_records);
        self.bulk_load(merged)
    }

    // ---------------- Internals ----------------

    fn merge_lists(a: Vec<T>, b: Vec<T>) -> Vec<T> {
        let mut merged = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0usize, 0usize);
        while i < a.len() && j < b.len() {
            if a[i].primary_key() < b[j].primary_key() {
                merged.push(a[i].clone());
                i += 1;
            } else {
                merged.push(b[j].clone());
                j += 1;
            }
        }
        merged.extend_from_slice(&a[i..]);
        merged.extend_from_slice(&b[j..]);
        merged
    }

    fn count_main(&mut self) -> Result<u64> {
        let len = self.main.seek(SeekFrom::End(0))?;
        Ok(len / self.main_record_size as u64)
    }

    fn count_aux(&mut self) -> Result<u64> {
        let len = self.aux.seek(SeekFrom::End(0))?;
        Ok(len / T::RECORD_SIZE as u64)
    }

    fn read_main_record(&mut self, pos: u64) -> Result<(T, bool)> {
        self.main.seek(SeekFrom::Start(pos * self.main_record_size as u64))?;
        let mut buf = vec![0u8; self.main_record_size];
        self.main.read_exact(&mut buf)?;
        Ok(Self::unpack_main_record(&buf))
    }

    fn unpack_main_record(buf: &[u8]) -> (T, bool) {
        let record = T::unpack(&buf[..T::RECORD_SIZE]);
        let deleted = buf[T::RECORD_SIZE] != 0;
        (record, deleted)
    }

    fn write_tombstone(&mut self, pos: u64) -> Result<()> {
        let flag_offset = pos * self.main_record_size as u64 + T::RECORD_SIZE as u64;
        self.main.seek(SeekFrom::Start(flag_offset))?;
        self.main.write_all(&[1u8])?;
        self.main.flush()?;
        Ok(())
    }

    fn read_all_main(&mut self) -> Result<Vec<(T, bool)>> {
        self.main.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.main.read_to_end(&mut buf)?;
        Ok(buf
            .chunks_exact(self.main_record_size)
            .map(Self::unpack_main_record)
            .collect())
    }

    fn read_all_aux(&mut self) -> Result<Vec<T>> {
        self.aux.seek(SeekFrom::Start(0))?;
        let mut buf = Vec::new();
        self.aux.read_to_end(&mut buf)?;
        Ok(buf.chunks_exact(T::RECORD_SIZE).map(T::unpack).collect())
    }

    fn write_all_main(&mut self, records: &[T]) -> Result<()> {
        self.main.seek(SeekFrom::Start(0))?;
        self.main.set_len(0)?;
        for r in records {
            self.main.write_all(&r.pack()?)?;
            self.main.write_all(&[0u8])?;
        }
        self.main.flush()?;
        Ok(())
    }

    fn write_all_aux(&mut self, records: &[T]) -> Result<()> {
        self.aux.seek(SeekFrom::Start(0))?;
        self.aux.set_len(0)?;
        for r in records {
            self.aux.write_all(&r.pack()?)?;
        }
        self.aux.flush()?;
        Ok(())
    }

    fn binary_search_main(&mut self, key: &str) -> Result<Option<(T, bool)>> {
        let count = self.count_main()?;
        if count == 0 {
            return Ok(None);
        }
        let (mut low, mut high) = (0i64, count as i64 - 1);
        while low <= high {
            let mid = (low + high) / 2;
            let (record, deleted) = self.read_main_record(mid as u64)?;
            let k = record.primary_key();
            if k == key {
                return Ok(Some((record, deleted)));
            } else if k.as_str() < key {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        Ok(None)
    }

    fn binary_search_aux(&mut self, key: &str) -> Result<Option<T>> {
        let records = self.read_all_aux()?;
        let (mut low, mut high) = (0i64, records.len() as i64 - 1);
        while low <= high {
            let mid = (low + high) / 2;
            let k = records[mid as usize].primary_key();
            if k == key {
                return Ok(Some(records[mid as usize].clone()));
            } else if k.as_str() < key {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        Ok(None)
    }

    fn find_record_pos(&mut self, key: &str) -> Result<Option<u64>> {
        let count = self.count_main()?;
        if count == 0 {
            return Ok(None);
        }
        let (mut low, mut high) = (0i64, count as i64 - 1);
        while low <= high {
            let mid = (low + high) / 2;
            let (record, _) = self.read_main_record(mid as u64)?;
            let k = record.primary_key();
            if k == key {
                return Ok(Some(mid as u64));
            } else if k.as_str() < key {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        Ok(None)
    }

    /// Position of the first main-file record with key `>= begin_key`.
    fn find_first_in_range(&mut self, begin_key: &str) -> Result<Option<u64>> {
        let count = self.count_main()?;
        if count == 0 {
            return Ok(None);
        }
        let (mut low, mut high) = (0i64, count as i64 - 1);
        let mut start_pos: Option<u64> = None;
        while low <= high {
            let mid = (low + high) / 2;
            let (record, _) = self.read_main_record(mid as u64)?;
            if record.primary_key().as_str() >= begin_key {
                start_pos = Some(mid as u64);
                high = mid - 1;
            } else {
                low = mid + 1;
            }
        }
        Ok(start_pos)
    }

    // ---------------- Testable-property helpers ----------------

    #[cfg(any(test, feature = "testing-api"))]
    pub fn k_threshold(&self) -> u64 {
        self.k_threshold
    }

    #[cfg(any(test, feature = "testing-api"))]
    pub fn aux_len(&mut self) -> Result<u64> {
        self.count_aux()
    }

    #[cfg(any(test, feature = "testing-api"))]
    pub fn main_is_sorted(&mut self) -> Result<bool> {
        let records = self.read_all_main()?;
        Ok(records.windows(2).all(|w| w[0].0.primary_key() <= w[1].0.primary_key()))
    }
}

impl<T: Record> Drop for SequentialFile<T> {
    fn drop(&mut self) {
        let _ = self.main.flush();
        let _ = self.aux.flush();
    }
}

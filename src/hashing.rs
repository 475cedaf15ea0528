//! Extendible Hashing file: a directory of `2^D` pointers into a data file
//! of fixed-size buckets, each with its own `local_depth` and an overflow
//! chain. Splitting a bucket only ever touches the directory slots that
//! pointed at it; doubling the directory never moves bucket data.

use std::collections::HashMap;
use std::fs::{self, File};
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::config::{EngineParams, HashingPaths};
use crate::error::{EngineError, Result};
use crate::paging::SlotFile;
use crate::record::Record;

#[derive(Debug, Clone, PartialEq)]
struct Directory {
    global_depth: usize,
    pointers: Vec<i64>,
}

impl Default for Directory {
    fn default() -> Self {
        Directory {
            global_depth: 2,
            pointers: vec![0, 1, 0, 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Bucket<T> {
    local_depth: usize,
    next_overflow: i64,
    records: Vec<T>,
}

/// Hash used to route keys to directory slots. `DefaultHasher`'s initial
/// state is fixed (unlike `RandomState`), so the same key always hashes
/// to the same directory slot across process restarts, which matters
/// here: the directory's bucket assignment must stay valid after reopen.
fn hash_key(key: &str) -> u64 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut h);
    h.finish()
}

pub struct ExtendibleHashing<T: Record> {
    data: SlotFile,
    dir_path: PathBuf,
    directory: Directory,
    params: EngineParams,
    bucket_size: usize,
    _marker: PhantomData<T>,
}

impl<T: Record> ExtendibleHashing<T> {
    pub fn open(paths: &HashingPaths, params: EngineParams) -> Result<Self> {
        params.validate()?;
        let bucket_size = 3 * 4 + params.m * T::RECORD_SIZE;
        let dir_path = PathBuf::from(&paths.directory_file);

        let directory = if dir_path.exists() {
            Self::read_directory(&dir_path)?
        } else {
            let d = Directory::default();
            Self::write_directory_at(&dir_path, &d)?;
            d
        };

        let mut data = SlotFile::open(&paths.data_file, bucket_size)?;
        if data.slot_count()? == 0 {
            let empty = Bucket {
                local_depth: 1,
                next_overflow: -1,
                records: Vec::<T>::new(),
            };
            let p0 = data.alloc()?;
            Self::write_bucket_raw(&mut data, bucket_size, params.m, p0, &empty)?;
            let p1 = data.alloc()?;
            Self::write_bucket_raw(&mut data, bucket_size, params.m, p1, &empty)?;
        }

        Ok(ExtendibleHashing {
            data,
            dir_path,
            directory,
            params,
            bucket_size,
            _marker: PhantomData,
        })
    }

    // ---------------- Public API ----------------

    pub fn search(&mut self, key: &str) -> Result<Option<T>> {
        let mut pos = self.bucket_pos_for(key);
        loop {
            let bucket = self.read_bucket(pos)?;
            if let Some(r) = bucket.records.into_iter().find(|r| r.primary_key() == key) {
                return Ok(Some(r));
            }
            if bucket.next_overflow < 0 {
                return Ok(None);
            }
            pos = bucket.next_overflow as u64;
        }
    }

    /// Insert or update by key. An empty key is a no-op.
    pub fn add(&mut self, record: T) -> Result<()> {
        if record.primary_key().is_empty() {
            return Ok(());
        }
        self.insert(record)
    }

    pub fn remove(&mut self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        let mut pos = self.bucket_pos_for(key);
        loop {
            let mut bucket = self.read_bucket(pos)?;
            if let Some(idx) = bucket.records.iter().position(|r| r.primary_key() == key) {
                bucket.records.remove(idx);
                self.write_bucket(pos, &bucket)?;
                return Ok(true);
            }
            if bucket.next_overflow < 0 {
                return Ok(false);
            }
            pos = bucket.next_overflow as u64;
        }
    }

    // ---------------- Internals ----------------

    fn dir_idx(&self, key: &str) -> usize {
        (hash_key(key) & ((1u64 << self.directory.global_depth) - 1)) as usize
    }

    fn bucket_pos_for(&self, key: &str) -> u64 {
        self.directory.pointers[self.dir_idx(key)] as u64
    }

    fn insert(&mut self, record: T) -> Result<()> {
        let key = record.primary_key();
        let head = self.bucket_pos_for(&key);
        let mut cur = head;
        loop {
            let bucket = self.read_bucket(cur)?;
            if let Some(idx) = bucket.records.iter().position(|r| r.primary_key() == key) {
                let mut b = bucket;
                b.records[idx] = record;
                self.write_bucket(cur, &b)?;
                return Ok(());
            }
            if bucket.records.len() < self.params.m {
                let mut b = bucket;
                b.records.push(record);
                self.write_bucket(cur, &b)?;
                return Ok(());
            }
            if bucket.next_overflow < 0 {
                let tail_local_depth = bucket.local_depth;
                return self.handle_overflow(head, cur, tail_local_depth, record);
            }
            cur = bucket.next_overflow as u64;
        }
    }

    fn handle_overflow(
        &mut self,
        head: u64,
        _tail: u64,
        tail_local_depth: usize,
        record: T,
    ) -> Result<()> {
        if tail_local_depth < self.directory.global_depth {
            self.split_bucket(head, record)
        } else {
            log::debug!(
                "hashing: doubling directory (global_depth {} -> {})",
                self.directory.global_depth,
                self.directory.global_depth + 1
            );
            self.double_directory()?;
            self.insert(record)
        }
    }

    fn split_bucket(&mut self, head_pos: u64, new_record: T) -> Result<()> {
        let mut collected = vec![new_record];
        let mut cur = head_pos;
        loop {
            let b = self.read_bucket(cur)?;
            collected.extend(b.records);
            if b.next_overflow < 0 {
                break;
            }
            cur = b.next_overflow as u64;
        }

        let head = self.read_bucket(head_pos)?;
        let new_depth = head.local_depth + 1;
        let new_bucket_pos = self.data.alloc()?;

        let mask = 1u64 << (new_depth - 1);
        for i in 0..self.directory.pointers.len() {
            if self.directory.pointers[i] as u64 == head_pos && (i as u64 & mask) != 0 {
                self.directory.pointers[i] = new_bucket_pos as i64;
            }
        }
        self.write_directory()?;

        let mut head_dest = Vec::new();
        let mut new_dest = Vec::new();
        for rec in collected {
            let idx = self.dir_idx(&rec.primary_key());
            let target = self.directory.pointers[idx] as u64;
            if target == head_pos {
                head_dest.push(rec);
            } else {
                new_dest.push(rec);
            }
        }
        log::debug!(
            "hashing: split bucket {head_pos} into {head_pos} ({} records) and {new_bucket_pos} ({} records), local_depth now {new_depth}",
            head_dest.len(),
            new_dest.len()
        );
        self.write_bucket_chain(head_pos, new_depth, head_dest)?;
        self.write_bucket_chain(new_bucket_pos, new_depth, new_dest)?;
        Ok(())
    }

    /// Writes `records` starting at `pos`, chunked into `M`-sized buckets
    /// at `local_depth`, allocating overflow buckets as needed.
    fn write_bucket_chain(&mut self, pos: u64, local_depth: usize, records: Vec<T>) -> Result<()> {
        if records.is_empty() {
            return self.write_bucket(
                pos,
                &Bucket {
                    local_depth,
                    next_overflow: -1,
                    records: vec![],
                },
            );
        }
        let chunks: Vec<Vec<T>> = records
            .chunks(self.params.m)
            .map(|c| c.to_vec())
            .collect();
        let mut slot = pos;
        for (i, chunk) in chunks.iter().enumerate() {
            let has_more = i + 1 < chunks.len();
            let next_overflow = if has_more {
                self.data.alloc()? as i64
            } else {
                -1
            };
            self.write_bucket(
                slot,
                &Bucket {
                    local_depth,
                    next_overflow,
                    records: chunk.clone(),
                },
            )?;
            if has_more {
                slot = next_overflow as u64;
            }
        }
        Ok(())
    }

    fn double_directory(&mut self) -> Result<()> {
        self.directory.global_depth += 1;
        let mut doubled = self.directory.pointers.clone();
        doubled.extend(self.directory.pointers.iter().copied());
        self.directory.pointers = doubled;
        self.write_directory()
    }

    fn write_directory(&mut self) -> Result<()> {
        Self::write_directory_at(&self.dir_path, &self.directory)
    }

    fn write_directory_at(path: &Path, d: &Directory) -> Result<()> {
        let mut buf = Vec::with_capacity(4 + d.pointers.len() * 4);
        buf.extend_from_slice(&(d.global_depth as i32).to_le_bytes());
        for &p in &d.pointers {
            buf.extend_from_slice(&(p as i32).to_le_bytes());
        }
        fs::write(path, buf)?;
        Ok(())
    }

    fn read_directory(path: &Path) -> Result<Directory> {
        let mut f = File::open(path)?;
        let mut head = [0u8; 4];
        f.read_exact(&mut head)?;
        let global_depth = i32::from_le_bytes(head).max(0) as usize;
        let n = 1usize << global_depth;
        let mut buf = vec![0u8; n * 4];
        f.read_exact(&mut buf)?;
        let pointers = buf
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes(c.try_into().unwrap()) as i64)
            .collect();
        Ok(Directory {
            global_depth,
            pointers,
        })
    }

    fn write_bucket(&mut self, slot: u64, bucket: &Bucket<T>) -> Result<()> {
        Self::write_bucket_raw(&mut self.data, self.bucket_size, self.params.m, slot, bucket)
    }

    fn write_bucket_raw(
        data: &mut SlotFile,
        bucket_size: usize,
        m: usize,
        slot: u64,
        bucket: &Bucket<T>,
    ) -> Result<()> {
        if bucket.records.len() > m {
            return Err(EngineError::Invariant(format!(
                "refusing to write bucket at slot {slot} with {} records (max {m})",
                bucket.records.len()
            )));
        }
        let mut buf = Vec::with_capacity(bucket_size);
        buf.extend_from_slice(&(bucket.records.len() as i32).to_le_bytes());
        buf.extend_from_slice(&(bucket.local_depth as i32).to_le_bytes());
        buf.extend_from_slice(&(bucket.next_overflow as i32).to_le_bytes());
        for i in 0..m {
            if let Some(r) = bucket.records.get(i) {
                buf.extend_from_slice(&r.pack()?);
            } else {
                buf.resize(buf.len() + T::RECORD_SIZE, 0);
            }
        }
        debug_assert_eq!(buf.len(), bucket_size);
        data.write_slot(slot, &buf)
    }

    fn read_bucket(&mut self, slot: u64) -> Result<Bucket<T>> {
        let buf = match self.data.read_slot(slot)? {
            Some(b) => b,
            None => {
                return Ok(Bucket {
                    local_depth: 1,
                    next_overflow: -1,
                    records: vec![],
                })
            }
        };
        let raw_count = i32::from_le_bytes(buf[0..4].try_into().unwrap()).max(0) as usize;
        let count = raw_count.min(self.params.m);
        let local_depth = i32::from_le_bytes(buf[4..8].try_into().unwrap()).max(0) as usize;
        let next_overflow = i32::from_le_bytes(buf[8..12].try_into().unwrap()) as i64;
        let mut records = Vec::with_capacity(count);
        let mut off = 12;
        for i in 0..self.params.m {
            let chunk = &buf[off..off + T::RECORD_SIZE];
            if i < count {
                records.push(T::unpack(chunk));
            }
            off += T::RECORD_SIZE;
        }
        Ok(Bucket {
            local_depth,
            next_overflow,
            records,
        })
    }

    // ---------------- Testable-property helpers ----------------

    #[cfg(any(test, feature = "testing-api"))]
    pub fn global_depth(&self) -> usize {
        self.directory.global_depth
    }

    #[cfg(any(test, feature = "testing-api"))]
    pub fn directory_len(&self) -> usize {
        self.directory.pointers.len()
    }

    /// Checks invariant 10 (`len(pointers) == 2^global_depth`) and
    /// invariant 11 (every bucket's `local_depth <= global_depth`, and all
    /// directory indices sharing a primary bucket agree on the low
    /// `local_depth` bits).
    #[cfg(any(test, feature = "testing-api"))]
    pub fn check_invariants(&mut self) -> Result<bool> {
        if self.directory.pointers.len() != 1usize << self.directory.global_depth {
            return Ok(false);
        }
        let mut groups: HashMap<u64, Vec<usize>> = HashMap::new();
        for (i, &p) in self.directory.pointers.iter().enumerate() {
            groups.entry(p as u64).or_default().push(i);
        }
        for (pos, idxs) in groups {
            let bucket = self.read_bucket(pos)?;
            if bucket.local_depth > self.directory.global_depth {
                return Ok(false);
            }
            let mask = (1usize << bucket.local_depth) - 1;
            let expected = idxs[0] & mask;
            if idxs.iter().any(|&i| i & mask != expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

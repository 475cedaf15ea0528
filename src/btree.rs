//! Disk-resident B+Tree with leaf chaining.
//!
//! Two backing files: an index file of fixed-width internal/leaf nodes
//! (slot 0 is always the current root) and a data file of fixed-width leaf
//! pages linked by `next_page`. A node is "leaf" when its children point
//! into the data file rather than into further index nodes; the descent
//! stack recorded by `add` lets a data-page split push a separator key up
//! through however many ancestor node splits it takes, including a
//! root split that keeps the root pinned to slot 0.

use std::marker::PhantomData;

use crate::config::{BTreePaths, EngineParams};
use crate::error::{EngineError, Result};
use crate::paging::SlotFile;
use crate::record::{decode_fixed_string, encode_fixed_string, Record};

/// In-memory view of an index node. `keys.len()` is the live key count;
/// `children.len()` is normally `keys.len() + 1`. Both may transiently
/// exceed their physical on-disk capacity (`R-1` keys, `R` children)
/// between an overflowing insert and the split that follows it.
#[derive(Debug, Clone, PartialEq)]
struct Node {
    is_leaf: bool,
    keys: Vec<String>,
    children: Vec<i64>,
}

/// In-memory view of a leaf data page.
#[derive(Debug, Clone, PartialEq)]
struct Page<T> {
    records: Vec<T>,
    next_page: i64,
}

fn node_size(params: &EngineParams) -> usize {
    1 + 4 + (params.r - 1) * params.key_len + params.r * 4
}

fn page_size(params: &EngineParams, record_size: usize) -> usize {
    4 + 4 + params.m * record_size
}

fn find_pos(node: &Node, key: &str) -> usize {
    let mut pos = 0;
    for k in &node.keys {
        if key >= k.as_str() {
            pos += 1;
        } else {
            break;
        }
    }
    pos
}

/// Max descent depth before a cycle is assumed and the read fails fast
/// with `InternalInvariantViolation`, per the spec's fail-stop policy for
/// corrupted files.
const MAX_DESCENT_DEPTH: usize = 10_000;

pub struct BPlusTree<T: Record> {
    index: SlotFile,
    data: SlotFile,
    params: EngineParams,
    node_size: usize,
    page_size: usize,
    _marker: PhantomData<T>,
}

impl<T: Record> BPlusTree<T> {
    pub fn open(paths: &BTreePaths, params: EngineParams) -> Result<Self> {
        params.validate()?;
        let node_size = node_size(&params);
        let page_size = page_size(&params, T::RECORD_SIZE);
        let index = SlotFile::open(&paths.index_file, node_size)?;
        let data = SlotFile::open(&paths.data_file, page_size)?;
        let mut tree = BPlusTree {
            index,
            data,
            params,
            node_size,
            page_size,
            _marker: PhantomData,
        };
        tree.ensure_skeleton()?;
        Ok(tree)
    }

    fn ensure_skeleton(&mut self) -> Result<()> {
        if self.data.slot_count()? == 0 {
            self.data.alloc()?;
        }
        if self.index.slot_count()? == 0 {
            self.index.alloc()?;
            let root = Node {
                is_leaf: true,
                keys: vec![],
                children: vec![0],
            };
            self.write_node(0, &root)?;
        }
        Ok(())
    }

    // ---------------- Public API ----------------

    pub fn search(&mut self, key: &str) -> Result<Option<T>> {
        let page_slot = self.descend_to_leaf_page(key)?;
        let page = self.read_page(page_slot)?;
        Ok(page.records.into_iter().find(|r| r.primary_key() == key))
    }

    /// Inclusive range scan: descends to the leaf page for `begin`, then
    /// walks the `next_page` chain, stopping as soon as a key exceeds `end`
    /// or the chain ends.
    pub fn range_search(&mut self, begin: &str, end: &str) -> Result<Vec<T>> {
        let mut results = Vec::new();
        let mut cur = Some(self.descend_to_leaf_page(begin)?);
        'chain: while let Some(slot) = cur {
            let page = self.read_page(slot)?;
            for record in page.records {
                let key = record.primary_key();
                if key.as_str() > end {
                    break 'chain;
                }
                if key.as_str() >= begin {
                    results.push(record);
                }
            }
            cur = if page.next_page < 0 {
                None
            } else {
                Some(page.next_page as u64)
            };
        }
        Ok(results)
    }

    /// Insert-or-update by key. An empty key is a no-op.
    pub fn add(&mut self, record: T) -> Result<()> {
        let key = record.primary_key();
        if key.is_empty() {
            return Ok(());
        }
        let (page_slot, stack) = self.descend_with_stack(&key)?;
        match self.data_page_upsert(page_slot, record)? {
            None => Ok(()),
            Some(page) => {
                let (sep, right_slot) = self.split_leaf_page(page_slot, page)?;
                self.propagate_separator(stack, sep, right_slot)
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Result<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        let page_slot = self.descend_to_leaf_page(key)?;
        let mut page = self.read_page(page_slot)?;
        let before = page.records.len();
        page.records.retain(|r| r.primary_key() != key);
        if page.records.len() == before {
            return Ok(false);
        }
        self.write_page(page_slot, &page)?;
        Ok(true)
    }

    // ---------------- Descent ----------------

    fn descend_to_leaf_page(&mut self, key: &str) -> Result<u64> {
        Ok(self.descend_with_stack(key)?.0)
    }

    fn descend_with_stack(&mut self, key: &str) -> Result<(u64, Vec<(u64, usize)>)> {
        let mut node_slot = 0u64;
        let mut stack = Vec::new();
        for _ in 0..MAX_DESCENT_DEPTH {
            let node = self.read_node(node_slot)?;
            let pos = find_pos(&node, key);
            stack.push((node_slot, pos));
            let child = *node.children.get(pos).ok_or_else(|| {
                EngineError::Invariant(format!(
                    "node at slot {node_slot} has no child at position {pos}"
                ))
            })?;
            if child < 0 {
                return Err(EngineError::Invariant(format!(
                    "node at slot {node_slot} has an unset child at position {pos}"
                )));
            }
            if node.is_leaf {
                return Ok((child as u64, stack));
            }
            node_slot = child as u64;
        }
        Err(EngineError::Invariant(
            "descent exceeded maximum depth; index file likely contains a cycle".to_string(),
        ))
    }

    // ---------------- Leaf page mutation ----------------

    /// Updates the key in place, or inserts it in sorted order. Returns the
    /// in-memory page (not yet written) when the insert pushed it past
    /// capacity and a split is needed; returns `None` when the page was
    /// already durably written (update, or an insert that still fits).
    fn data_page_upsert(&mut self, page_slot: u64, record: T) -> Result<Option<Page<T>>> {
        let mut page = self.read_page(page_slot)?;
        let key = record.primary_key();
        if let Some(idx) = page.records.iter().position(|r| r.primary_key() == key) {
            page.records[idx] = record;
            self.write_page(page_slot, &page)?;
            return Ok(None);
        }
        let idx = page
            .records
            .iter()
            .position(|r| r.primary_key() > key)
            .unwrap_or(page.records.len());
        page.records.insert(idx, record);
        if page.records.len() > self.params.m {
            Ok(Some(page))
        } else {
            self.write_page(page_slot, &page)?;
            Ok(None)
        }
    }

    fn split_leaf_page(&mut self, left_slot: u64, mut page: Page<T>) -> Result<(String, u64)> {
        let mid = page.records.len().div_ceil(2);
        let right_records = page.records.split_off(mid);
        let old_next = page.next_page;
        let right_slot = self.data.alloc()?;
        let separator = right_records[0].primary_key();

        let left_page = Page {
            records: page.records,
            next_page: right_slot as i64,
        };
        let right_page = Page {
            records: right_records,
            next_page: old_next,
        };
        self.write_page(left_slot, &left_page)?;
        self.write_page(right_slot, &right_page)?;
        Ok((separator, right_slot))
    }

    // ---------------- Ancestor propagation ----------------

    fn propagate_separator(
        &mut self,
        mut stack: Vec<(u64, usize)>,
        mut sep: String,
        mut right: u64,
    ) -> Result<()> {
        while let Some((slot, pos)) = stack.pop() {
            match self.insert_into_node(slot, pos, &sep, right)? {
                None => return Ok(()),
                Some((new_sep, new_right)) => {
                    sep = new_sep;
                    right = new_right;
                }
            }
        }
        Ok(())
    }

    /// Inserts `sep`/`right` into the node at `node_slot` just after child
    /// position `pos`. If the node overflows (`keys.len() > R-1`), it is
    /// split: `mid = count / 2` is promoted, the left half stays (or, for
    /// the root, is relocated so slot 0 keeps the root), the right half
    /// goes to a fresh slot. Returns `Some((promoted_key, right_slot))`
    /// when the caller must keep propagating; `None` when the insert was
    /// fully absorbed (including the root-split case, which rewrites slot
    /// 0 directly and needs no further propagation).
    fn insert_into_node(
        &mut self,
        node_slot: u64,
        pos: usize,
        sep: &str,
        right_child: u64,
    ) -> Result<Option<(String, u64)>> {
        let mut node = self.read_node(node_slot)?;
        node.keys.insert(pos, sep.to_string());
        node.children.insert(pos + 1, right_child as i64);

        if node.keys.len() <= self.params.r - 1 {
            self.write_node(node_slot, &node)?;
            return Ok(None);
        }

        let mid = node.keys.len() / 2;
        let promoted = node.keys[mid].clone();
        let left = Node {
            is_leaf: node.is_leaf,
            keys: node.keys[..mid].to_vec(),
            children: node.children[..mid + 1].to_vec(),
        };
        let right = Node {
            is_leaf: node.is_leaf,
            keys: node.keys[mid + 1..].to_vec(),
            children: node.children[mid + 1..].to_vec(),
        };
        let right_slot = self.index.alloc()?;
        self.write_node(right_slot, &right)?;

        if node_slot == 0 {
            let left_slot = self.index.alloc()?;
            self.write_node(left_slot, &left)?;
            self.write_node(
                0,
                &Node {
                    is_leaf: false,
                    keys: vec![promoted],
                    children: vec![left_slot as i64, right_slot as i64],
                },
            )?;
            log::debug!("btree: root split, new children at slots {left_slot} and {right_slot}");
            Ok(None)
        } else {
            self.write_node(node_slot, &left)?;
            Ok(Some((promoted, right_slot)))
        }
    }

    // ---------------- Slot codec ----------------

    fn write_node(&mut self, slot: u64, node: &Node) -> Result<()> {
        if node.keys.len() > self.params.r - 1 {
            return Err(EngineError::Invariant(format!(
                "refusing to write node at slot {slot} with {} keys (max {})",
                node.keys.len(),
                self.params.r - 1
            )));
        }
        let mut buf = Vec::with_capacity(self.node_size);
        buf.push(node.is_leaf as u8);
        buf.extend_from_slice(&(node.keys.len() as i32).to_le_bytes());
        for i in 0..self.params.r - 1 {
            if let Some(k) = node.keys.get(i) {
                encode_fixed_string(k, self.params.key_len, &mut buf);
            } else {
                buf.resize(buf.len() + self.params.key_len, 0);
            }
        }
        for i in 0..self.params.r {
            let v = node.children.get(i).copied().unwrap_or(-1);
            buf.extend_from_slice(&(v as i32).to_le_bytes());
        }
        debug_assert_eq!(buf.len(), self.node_size);
        self.index.write_slot(slot, &buf)
    }

    fn read_node(&mut self, slot: u64) -> Result<Node> {
        let buf = match self.index.read_slot(slot)? {
            Some(b) => b,
            None => {
                return Ok(Node {
                    is_leaf: true,
                    keys: vec![],
                    children: vec![],
                })
            }
        };
        let is_leaf = buf[0] != 0;
        let raw_count = i32::from_le_bytes(buf[1..5].try_into().unwrap()).max(0) as usize;
        let count = raw_count.min(self.params.r - 1);
        let mut off = 5;
        let mut keys = Vec::with_capacity(count);
        for i in 0..self.params.r - 1 {
            let chunk = &buf[off..off + self.params.key_len];
            if i < count {
                keys.push(decode_fixed_string(chunk));
            }
            off += self.params.key_len;
        }
        let mut children = Vec::with_capacity(count + 1);
        for i in 0..self.params.r {
            let v = i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            if i <= count {
                children.push(v as i64);
            }
        }
        Ok(Node {
            is_leaf,
            keys,
            children,
        })
    }

    fn write_page(&mut self, slot: u64, page: &Page<T>) -> Result<()> {
        if page.records.len() > self.params.m {
            return Err(EngineError::Invariant(format!(
                "refusing to write page at slot {slot} with {} records (max {})",
                page.records.len(),
                self.params.m
            )));
        }
        let mut buf = Vec::with_capacity(self.page_size);
        buf.extend_from_slice(&(page.records.len() as i32).to_le_bytes());
        buf.extend_from_slice(&(page.next_page as i32).to_le_bytes());
        for i in 0..self.params.m {
            if let Some(r) = page.records.get(i) {
                buf.extend_from_slice(&r.pack()?);
            } else {
                buf.resize(buf.len() + T::RECORD_SIZE, 0);
            }
        }
        debug_assert_eq!(buf.len(), self.page_size);
        self.data.write_slot(slot, &buf)
    }

    fn read_page(&mut self, slot: u64) -> Result<Page<T>> {
        let buf = match self.data.read_slot(slot)? {
            Some(b) => b,
            None => {
                return Ok(Page {
                    records: vec![],
                    next_page: -1,
                })
            }
        };
        let raw_count = i32::from_le_bytes(buf[0..4].try_into().unwrap()).max(0) as usize;
        let count = raw_count.min(self.params.m);
        let next_page = i32::from_le_bytes(buf[4..8].try_into().unwrap()) as i64;
        let mut records = Vec::with_capacity(count);
        let mut off = 8;
        for i in 0..self.params.m {
            let chunk = &buf[off..off + T::RECORD_SIZE];
            if i < count {
                records.push(T::unpack(chunk));
            }
            off += T::RECORD_SIZE;
        }
        Ok(Page { records, next_page })
    }

    // ---------------- Testable-property helpers ----------------

    /// Concatenates every leaf page's records, following `next_page` from
    /// the leftmost leaf. Used to check the leaf-chain-order property.
    #[cfg(any(test, feature = "testing-api"))]
    pub fn leaf_chain_records(&mut self) -> Result<Vec<T>> {
        let mut out = Vec::new();
        let mut cur = Some(self.descend_to_leaf_page("")?);
        while let Some(slot) = cur {
            let page = self.read_page(slot)?;
            cur = if page.next_page < 0 {
                None
            } else {
                Some(page.next_page as u64)
            };
            out.extend(page.records);
        }
        Ok(out)
    }

    /// Walks every reachable node/page and checks the fanout bound
    /// (`count <= R-1` for nodes, `count <= M` for pages).
    #[cfg(any(test, feature = "testing-api"))]
    pub fn check_fanout_bounds(&mut self) -> Result<bool> {
        let mut stack = vec![0u64];
        let mut seen = std::collections::HashSet::new();
        while let Some(slot) = stack.pop() {
            if !seen.insert(slot) {
                continue;
            }
            let node = self.read_node(slot)?;
            if node.keys.len() > self.params.r - 1 {
                return Ok(false);
            }
            if node.is_leaf {
                for &child in &node.children {
                    if child >= 0 {
                        let page = self.read_page(child as u64)?;
                        if page.records.len() > self.params.m {
                            return Ok(false);
                        }
                    }
                }
            } else {
                for &child in &node.children {
                    if child >= 0 {
                        stack.push(child as u64);
                    }
                }
            }
        }
        Ok(true)
    }
}

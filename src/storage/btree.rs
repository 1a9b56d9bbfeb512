//! B+ tree index for keystone
//!
//! A persistent, page-oriented B+ tree keyed by `i32` primary keys, mapping
//! each key to the byte offset of its record in the table's data file.
//!
//! The file starts with a header page recording the page size, branching
//! factor, root page id, and next allocatable page id, so a tree can be
//! reopened without out-of-band knowledge. Every other page is one node:
//! interior nodes hold sorted keys and child pointers, leaves hold sorted
//! `(key, offset)` pairs and a right-sibling pointer.
//!
//! Duplicate keys are permitted; a lookup returns all offsets stored under
//! the key in insertion order. There is no delete operation: after a data
//! file rewrite the index is rebuilt from the surviving records and renamed
//! into place (see [`BPlusTree::rebuild`]).

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Page size in bytes (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// Maximum keys per node for newly created trees
const DEFAULT_ORDER: usize = 255;

/// Magic number identifying an index file ("KIDX")
const MAGIC: u32 = 0x5844_494B;

/// Page ID type; page 0 is the header, so 0 doubles as "no page"
type PageId = u32;

const NO_PAGE: PageId = 0;

/// Leaf page: type byte, key count, sibling pointer, then entries
const LEAF_HEADER: usize = 1 + 2 + 4;
/// Interior page: type byte, key count, leftmost child, then entries
const INTERIOR_HEADER: usize = 1 + 2 + 4;

const PAGE_TYPE_LEAF: u8 = 0;
const PAGE_TYPE_INTERIOR: u8 = 1;

/// One node in memory
#[derive(Debug)]
enum Node {
    Leaf {
        keys: Vec<i32>,
        offsets: Vec<u64>,
        next: PageId,
    },
    Interior {
        keys: Vec<i32>,
        children: Vec<PageId>,
    },
}

/// Persistent B+ tree index over one table's primary key
#[derive(Debug)]
pub struct BPlusTree {
    file: File,
    path: PathBuf,
    root: PageId,
    next_page: PageId,
    order: usize,
}

impl BPlusTree {
    /// Open an index file, creating it with a single empty leaf root if it
    /// does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_order(path, DEFAULT_ORDER)
    }

    /// Open as [`BPlusTree::open`], but new trees use the given branching
    /// factor. The order of an existing tree always comes from its header.
    pub fn open_with_order(path: impl AsRef<Path>, order: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if file.metadata()?.len() == 0 {
            let mut tree = Self {
                file,
                path,
                root: 1,
                next_page: 2,
                order,
            };
            tree.write_header()?;
            tree.write_node(
                1,
                &Node::Leaf {
                    keys: Vec::new(),
                    offsets: Vec::new(),
                    next: NO_PAGE,
                },
            )?;
            return Ok(tree);
        }

        let mut header = [0u8; PAGE_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        let magic = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let page_size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
        if magic != MAGIC || page_size != PAGE_SIZE {
            return Err(Self::corrupted(&path, "bad magic or page size".to_string()));
        }
        let order = u16::from_le_bytes(header[8..10].try_into().unwrap()) as usize;
        let root = u32::from_le_bytes(header[10..14].try_into().unwrap());
        let next_page = u32::from_le_bytes(header[14..18].try_into().unwrap());

        Ok(Self {
            file,
            path,
            root,
            next_page,
            order,
        })
    }

    /// Insert a `(key, offset)` entry. Duplicate keys are allowed.
    pub fn insert(&mut self, key: i32, offset: u64) -> Result<()> {
        if let Some((separator, right_page)) = self.insert_into(self.root, key, offset)? {
            // root split: grow the tree by one level
            let new_root = self.allocate_page();
            self.write_node(
                new_root,
                &Node::Interior {
                    keys: vec![separator],
                    children: vec![self.root, right_page],
                },
            )?;
            self.root = new_root;
        }
        self.write_header()
    }

    /// Return every offset stored under `key`, in insertion order.
    pub fn search(&mut self, key: i32) -> Result<Vec<u64>> {
        let mut page = self.root;
        // descend towards the leftmost leaf that can hold the key
        loop {
            match self.read_node(page)? {
                Node::Interior { keys, children } => {
                    let idx = keys.partition_point(|k| *k < key);
                    page = children[idx];
                }
                Node::Leaf { keys, offsets, next } => {
                    let mut results = Vec::new();
                    let mut idx = keys.partition_point(|k| *k < key);
                    let (mut keys, mut offsets, mut next) = (keys, offsets, next);
                    loop {
                        while idx < keys.len() && keys[idx] == key {
                            results.push(offsets[idx]);
                            idx += 1;
                        }
                        // stop at a larger key or the end of the leaf chain;
                        // an equal run can continue on the right sibling
                        if idx < keys.len() || next == NO_PAGE {
                            return Ok(results);
                        }
                        match self.read_node(next)? {
                            Node::Leaf {
                                keys: k,
                                offsets: o,
                                next: n,
                            } => {
                                keys = k;
                                offsets = o;
                                next = n;
                                idx = 0;
                            }
                            Node::Interior { .. } => {
                                return Err(Self::corrupted(
                                    &self.path,
                                    "leaf sibling points at an interior page".to_string(),
                                ))
                            }
                        }
                    }
                }
            }
        }
    }

    /// Build a fresh index at `<path>.tmp` from `entries` and atomically
    /// rename it over `path`.
    pub fn rebuild(
        path: impl AsRef<Path>,
        entries: impl IntoIterator<Item = (i32, u64)>,
    ) -> Result<()> {
        let path = path.as_ref();
        let tmp_path = rebuild_tmp_path(path);
        if tmp_path.exists() {
            std::fs::remove_file(&tmp_path)?;
        }

        let mut count = 0usize;
        {
            let mut fresh = Self::open(&tmp_path)?;
            for (key, offset) in entries {
                fresh.insert(key, offset)?;
                count += 1;
            }
        }
        std::fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), entries = count, "rebuilt index");
        Ok(())
    }

    fn insert_into(
        &mut self,
        page: PageId,
        key: i32,
        offset: u64,
    ) -> Result<Option<(i32, PageId)>> {
        match self.read_node(page)? {
            Node::Leaf {
                mut keys,
                mut offsets,
                next,
            } => {
                // duplicates land after existing equals, preserving
                // insertion order within the run
                let pos = keys.partition_point(|k| *k <= key);
                keys.insert(pos, key);
                offsets.insert(pos, offset);

                if keys.len() <= self.order {
                    self.write_node(page, &Node::Leaf { keys, offsets, next })?;
                    return Ok(None);
                }

                let mid = keys.len() / 2;
                let right_keys = keys.split_off(mid);
                let right_offsets = offsets.split_off(mid);
                let separator = right_keys[0];

                let right_page = self.allocate_page();
                self.write_node(
                    right_page,
                    &Node::Leaf {
                        keys: right_keys,
                        offsets: right_offsets,
                        next,
                    },
                )?;
                self.write_node(
                    page,
                    &Node::Leaf {
                        keys,
                        offsets,
                        next: right_page,
                    },
                )?;
                Ok(Some((separator, right_page)))
            }
            Node::Interior {
                mut keys,
                mut children,
            } => {
                let idx = keys.partition_point(|k| *k <= key);
                let Some((separator, new_child)) = self.insert_into(children[idx], key, offset)?
                else {
                    return Ok(None);
                };

                keys.insert(idx, separator);
                children.insert(idx + 1, new_child);

                if keys.len() <= self.order {
                    self.write_node(page, &Node::Interior { keys, children })?;
                    return Ok(None);
                }

                let mid = keys.len() / 2;
                let up = keys[mid];
                let right_keys = keys.split_off(mid + 1);
                keys.pop(); // `up` moves to the parent
                let right_children = children.split_off(mid + 1);

                let right_page = self.allocate_page();
                self.write_node(
                    right_page,
                    &Node::Interior {
                        keys: right_keys,
                        children: right_children,
                    },
                )?;
                self.write_node(page, &Node::Interior { keys, children })?;
                Ok(Some((up, right_page)))
            }
        }
    }

    fn allocate_page(&mut self) -> PageId {
        let page = self.next_page;
        self.next_page += 1;
        page
    }

    fn write_header(&mut self) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&(PAGE_SIZE as u32).to_le_bytes());
        buf[8..10].copy_from_slice(&(self.order as u16).to_le_bytes());
        buf[10..14].copy_from_slice(&self.root.to_le_bytes());
        buf[14..18].copy_from_slice(&self.next_page.to_le_bytes());
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn read_node(&mut self, page: PageId) -> Result<Node> {
        let mut buf = [0u8; PAGE_SIZE];
        self.file
            .seek(SeekFrom::Start(page as u64 * PAGE_SIZE as u64))?;
        self.file.read_exact(&mut buf)?;

        let count = u16::from_le_bytes(buf[1..3].try_into().unwrap()) as usize;
        match buf[0] {
            PAGE_TYPE_LEAF => {
                let next = u32::from_le_bytes(buf[3..7].try_into().unwrap());
                let mut keys = Vec::with_capacity(count);
                let mut offsets = Vec::with_capacity(count);
                let mut pos = LEAF_HEADER;
                for _ in 0..count {
                    keys.push(i32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()));
                    offsets.push(u64::from_le_bytes(
                        buf[pos + 4..pos + 12].try_into().unwrap(),
                    ));
                    pos += 12;
                }
                Ok(Node::Leaf { keys, offsets, next })
            }
            PAGE_TYPE_INTERIOR => {
                let mut children = Vec::with_capacity(count + 1);
                children.push(u32::from_le_bytes(buf[3..7].try_into().unwrap()));
                let mut keys = Vec::with_capacity(count);
                let mut pos = INTERIOR_HEADER;
                for _ in 0..count {
                    keys.push(i32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()));
                    children.push(u32::from_le_bytes(
                        buf[pos + 4..pos + 8].try_into().unwrap(),
                    ));
                    pos += 8;
                }
                Ok(Node::Interior { keys, children })
            }
            other => Err(Self::corrupted(
                &self.path,
                format!("unknown page type {} in page {}", other, page),
            )),
        }
    }

    fn write_node(&mut self, page: PageId, node: &Node) -> Result<()> {
        let mut buf = [0u8; PAGE_SIZE];
        match node {
            Node::Leaf { keys, offsets, next } => {
                buf[0] = PAGE_TYPE_LEAF;
                buf[1..3].copy_from_slice(&(keys.len() as u16).to_le_bytes());
                buf[3..7].copy_from_slice(&next.to_le_bytes());
                let mut pos = LEAF_HEADER;
                for (key, offset) in keys.iter().zip(offsets) {
                    buf[pos..pos + 4].copy_from_slice(&key.to_le_bytes());
                    buf[pos + 4..pos + 12].copy_from_slice(&offset.to_le_bytes());
                    pos += 12;
                }
            }
            Node::Interior { keys, children } => {
                buf[0] = PAGE_TYPE_INTERIOR;
                buf[1..3].copy_from_slice(&(keys.len() as u16).to_le_bytes());
                buf[3..7].copy_from_slice(&children[0].to_le_bytes());
                let mut pos = INTERIOR_HEADER;
                for (key, child) in keys.iter().zip(&children[1..]) {
                    buf[pos..pos + 4].copy_from_slice(&key.to_le_bytes());
                    buf[pos + 4..pos + 8].copy_from_slice(&child.to_le_bytes());
                    pos += 8;
                }
            }
        }
        self.file
            .seek(SeekFrom::Start(page as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    fn corrupted(path: &Path, reason: String) -> Error {
        Error::Corrupted {
            file: path.display().to_string(),
            reason,
        }
    }
}

/// Temp-file sibling used while rebuilding an index
pub fn rebuild_tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_insert_and_search() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open(dir.path().join("t.idx")).unwrap();

        for (key, offset) in [(5, 50), (3, 30), (7, 70), (1, 10)] {
            tree.insert(key, offset).unwrap();
        }

        assert_eq!(tree.search(5).unwrap(), vec![50]);
        assert_eq!(tree.search(1).unwrap(), vec![10]);
        assert_eq!(tree.search(99).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_duplicates_return_in_insertion_order() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open_with_order(dir.path().join("t.idx"), 4).unwrap();

        for i in 0..10 {
            tree.insert(42, 100 + i).unwrap();
            tree.insert(7, 200 + i).unwrap();
        }

        assert_eq!(tree.search(42).unwrap(), (100..110).collect::<Vec<_>>());
        assert_eq!(tree.search(7).unwrap(), (200..210).collect::<Vec<_>>());
    }

    #[test]
    fn test_many_inserts_force_splits() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open_with_order(dir.path().join("t.idx"), 4).unwrap();

        // interleave so the tree sees non-monotone input
        for i in (0..200).step_by(2) {
            tree.insert(i, i as u64).unwrap();
        }
        for i in (1..200).step_by(2) {
            tree.insert(i, i as u64).unwrap();
        }

        for i in 0..200 {
            assert_eq!(tree.search(i).unwrap(), vec![i as u64], "key {}", i);
        }
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");

        {
            let mut tree = BPlusTree::open_with_order(&path, 4).unwrap();
            for i in 0..100 {
                tree.insert(i, (i * 3) as u64).unwrap();
            }
        }

        let mut tree = BPlusTree::open(&path).unwrap();
        // order comes from the header, not the default
        assert_eq!(tree.order, 4);
        for i in 0..100 {
            assert_eq!(tree.search(i).unwrap(), vec![(i * 3) as u64]);
        }
    }

    #[test]
    fn test_negative_keys() {
        let dir = tempdir().unwrap();
        let mut tree = BPlusTree::open_with_order(dir.path().join("t.idx"), 4).unwrap();

        for i in -50..50 {
            tree.insert(i, (i + 50) as u64).unwrap();
        }
        assert_eq!(tree.search(-50).unwrap(), vec![0]);
        assert_eq!(tree.search(-1).unwrap(), vec![49]);
    }

    #[test]
    fn test_rebuild_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");

        {
            let mut tree = BPlusTree::open(&path).unwrap();
            for i in 0..10 {
                tree.insert(i, i as u64).unwrap();
            }
        }

        BPlusTree::rebuild(&path, (0..5).map(|i| (i, (i * 2) as u64))).unwrap();

        let mut tree = BPlusTree::open(&path).unwrap();
        assert_eq!(tree.search(3).unwrap(), vec![6]);
        assert_eq!(tree.search(7).unwrap(), Vec::<u64>::new());
        assert!(!rebuild_tmp_path(&path).exists());
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.idx");
        std::fs::write(&path, vec![0xFFu8; PAGE_SIZE]).unwrap();

        assert!(matches!(
            BPlusTree::open(&path),
            Err(Error::Corrupted { .. })
        ));
    }
}

//! B+ tree construction, bulk build, and insertion.

use std::path::{Path, PathBuf};

use crate::buffer::BufferManager;
use crate::common::{Error, FileId, PageId, RecordId, Result};
use crate::index::btree::node::{
    parent_offset, InternalNode, LeafNode, MetaRecord, INTERNAL_FANOUT, LEAF_FANOUT,
    MAX_RELATION_NAME,
};
use crate::index::btree::scan::ScanState;
use crate::index::AttrType;
use crate::storage::Relation;

/// A B+ tree index over one integer attribute of a relation.
///
/// The index lives in its own page file, named `<relation>.<attrOffset>`
/// next to the relation file. Constructing one either adopts an existing
/// index file or creates it and bulk-loads every record of the relation.
///
/// At most one range scan may be active per index at a time; the scan
/// methods live in the `scan` module.
pub struct BTreeIndex<'a> {
    buf: &'a BufferManager,
    file: FileId,
    path: PathBuf,
    relation_name: String,
    attr_byte_offset: usize,
    attr_type: AttrType,

    meta_page: PageId,
    pub(super) root_page: PageId,
    /// Number of internal levels between the root and the leaves;
    /// 0 means the root itself is a leaf.
    pub(super) depth: u32,
    leaf_occupancy: u32,
    node_occupancy: u32,

    // Effective fan-outs; the on-disk layout always reserves room for the
    // full LEAF_FANOUT/INTERNAL_FANOUT arrays, so these only control when
    // nodes split. Persisted in the meta record and adopted on open.
    leaf_fanout: usize,
    internal_fanout: usize,

    pub(super) scan: Option<ScanState>,
    closed: bool,
}

impl<'a> BTreeIndex<'a> {
    /// Index file name for a relation/attribute pair.
    pub fn index_name(relation_name: &str, attr_byte_offset: usize) -> String {
        format!("{}.{}", relation_name, attr_byte_offset)
    }

    /// Open the index for `relation` on the integer attribute at
    /// `attr_byte_offset`, creating and bulk-loading it if the index file
    /// does not exist yet.
    ///
    /// # Errors
    /// - `Error::BadIndexInfo` for a non-integer attribute type, an
    ///   over-long relation name, or an existing index file whose meta
    ///   record does not match the arguments
    pub fn new(
        buf: &'a BufferManager,
        relation: &Relation<'_>,
        attr_byte_offset: usize,
        attr_type: AttrType,
    ) -> Result<Self> {
        if attr_type != AttrType::Int {
            return Err(Error::BadIndexInfo(format!(
                "unsupported attribute type {:?}: only Int is implemented",
                attr_type
            )));
        }
        if relation.name().len() > MAX_RELATION_NAME {
            return Err(Error::BadIndexInfo(format!(
                "relation name {:?} exceeds {} bytes",
                relation.name(),
                MAX_RELATION_NAME
            )));
        }

        let file_name = Self::index_name(relation.name(), attr_byte_offset);
        let path = relation.path().with_file_name(&file_name);

        if path.is_file() {
            Self::open_existing(buf, relation, attr_byte_offset, attr_type, path)
        } else {
            Self::create_and_build(buf, relation, attr_byte_offset, attr_type, path)
        }
    }

    fn open_existing(
        buf: &'a BufferManager,
        relation: &Relation<'_>,
        attr_byte_offset: usize,
        attr_type: AttrType,
        path: PathBuf,
    ) -> Result<Self> {
        let file = buf.open_file(&path)?;
        let (meta_page, meta) = match Self::read_meta_for_open(buf, file, &path) {
            Ok(meta) => meta,
            Err(err) => {
                // Don't leave a rejected file registered
                let _ = buf.close_file(file);
                return Err(err);
            }
        };

        if meta.relation_name != relation.name()
            || meta.attr_byte_offset != attr_byte_offset as u32
            || meta.attr_type != attr_type as u8
        {
            let _ = buf.close_file(file);
            return Err(Error::BadIndexInfo(format!(
                "index file {:?} was built for relation {:?} at offset {}",
                path, meta.relation_name, meta.attr_byte_offset
            )));
        }

        Ok(Self {
            buf,
            file,
            path,
            relation_name: meta.relation_name,
            attr_byte_offset,
            attr_type,
            meta_page,
            root_page: meta.root_page,
            depth: meta.depth,
            leaf_occupancy: meta.leaf_occupancy,
            node_occupancy: meta.node_occupancy,
            leaf_fanout: meta.leaf_fanout as usize,
            internal_fanout: meta.internal_fanout as usize,
            scan: None,
            closed: false,
        })
    }

    fn read_meta_for_open(
        buf: &BufferManager,
        file: FileId,
        path: &Path,
    ) -> Result<(PageId, MetaRecord)> {
        let meta_page = buf
            .first_page_id(file)?
            .ok_or_else(|| Error::BadIndexInfo(format!("index file {:?} is empty", path)))?;

        let guard = buf.fetch_page(file, meta_page)?;
        let meta = MetaRecord::decode(&guard, meta_page);
        drop(guard);
        buf.unpin_page(file, meta_page, false)?;

        Ok((meta_page, meta?))
    }

    fn create_and_build(
        buf: &'a BufferManager,
        relation: &Relation<'_>,
        attr_byte_offset: usize,
        attr_type: AttrType,
        path: PathBuf,
    ) -> Result<Self> {
        let file = buf.create_file(&path)?;

        // Meta page first, then an empty root leaf
        let (meta_page, guard) = buf.allocate_page(file)?;
        drop(guard);
        buf.unpin_page(file, meta_page, true)?;

        let (root_page, mut guard) = buf.allocate_page(file)?;
        LeafNode::new().encode(&mut guard);
        drop(guard);
        buf.unpin_page(file, root_page, true)?;

        let mut index = Self {
            buf,
            file,
            path,
            relation_name: relation.name().to_string(),
            attr_byte_offset,
            attr_type,
            meta_page,
            root_page,
            depth: 0,
            leaf_occupancy: 0,
            node_occupancy: 0,
            leaf_fanout: LEAF_FANOUT,
            internal_fanout: INTERNAL_FANOUT,
            scan: None,
            closed: false,
        };
        index.write_meta()?;

        // Bulk build: one insert per record of the relation; end of data
        // from the scanner is the expected stop signal.
        let mut scan = relation.scan()?;
        while let Some((rid, record)) = scan.next_record()? {
            let at = attr_byte_offset;
            if record.len() < at + 4 {
                return Err(Error::BadIndexInfo(format!(
                    "record {} is too short for attribute offset {}",
                    rid, at
                )));
            }
            let key = i32::from_le_bytes([
                record[at],
                record[at + 1],
                record[at + 2],
                record[at + 3],
            ]);
            index.insert_entry(key, rid)?;
        }

        Ok(index)
    }

    /// Path of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Page id of the current root node.
    pub fn root_page_no(&self) -> PageId {
        self.root_page
    }

    /// Number of internal levels (0 while the root is still a leaf).
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Total entries across all leaves.
    pub fn leaf_occupancy(&self) -> u32 {
        self.leaf_occupancy
    }

    /// Total separator keys across all internal nodes.
    pub fn node_occupancy(&self) -> u32 {
        self.node_occupancy
    }

    /// Persist the meta record, flush the index file, and release it.
    ///
    /// An active scan is ended first. Pin leaks surface here as
    /// `Error::PagePinned` from the flush.
    pub fn close(mut self) -> Result<()> {
        if self.scan.is_some() {
            self.end_scan()?;
        }
        self.write_meta()?;
        self.buf.close_file(self.file)?;
        self.closed = true;
        Ok(())
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert a (key, record id) pair.
    ///
    /// Splits the leaf when full and propagates separator keys upward,
    /// growing a new root (and the depth) when the split reaches it.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let leaf_pid = self.find_leaf(key)?;
        let mut leaf = self.read_leaf(leaf_pid)?;

        // Duplicates land after existing equal keys
        let at = leaf.entries.partition_point(|(k, _)| *k <= key);
        leaf.entries.insert(at, (key, rid));
        self.leaf_occupancy += 1;

        if leaf.entries.len() <= self.leaf_fanout {
            return self.write_leaf(leaf_pid, &leaf);
        }
        self.split_leaf(leaf_pid, leaf)
    }

    /// Descend from the root to the leaf that covers `key`.
    pub(super) fn find_leaf(&self, key: i32) -> Result<PageId> {
        let mut pid = self.root_page;
        for _ in 0..self.depth {
            let node = self.read_internal(pid)?;
            pid = node.child_for(key);
        }
        Ok(pid)
    }

    /// Split an over-full leaf and promote the separator.
    fn split_leaf(&mut self, left_pid: PageId, mut left: LeafNode) -> Result<()> {
        let mid = left.entries.len() / 2;
        let right_entries = left.entries.split_off(mid);
        // Separator is the first key of the right half, which stays there
        let separator = right_entries[0].0;

        let right = LeafNode {
            parent: left.parent,
            right_sibling: left.right_sibling,
            entries: right_entries,
        };
        let (right_pid, mut guard) = self.buf.allocate_page(self.file)?;
        right.encode(&mut guard);
        drop(guard);
        self.buf.unpin_page(self.file, right_pid, true)?;

        left.right_sibling = right_pid;
        let parent = left.parent;
        self.write_leaf(left_pid, &left)?;

        self.promote(left_pid, separator, right_pid, parent, None)
    }

    /// Insert a promoted (separator, right child) pair into the parent
    /// chain, splitting internal nodes as needed, up to a new root.
    ///
    /// `child_level` is `None` when the split children are leaves,
    /// otherwise the level of the split internal nodes.
    fn promote(
        &mut self,
        mut left_pid: PageId,
        mut key: i32,
        mut right_pid: PageId,
        mut parent_pid: PageId,
        mut child_level: Option<u16>,
    ) -> Result<()> {
        loop {
            if !parent_pid.is_valid() {
                // The split node was the root: grow a new one above it
                let root = InternalNode {
                    parent: PageId::INVALID,
                    level: child_level.map_or(0, |l| l + 1),
                    keys: vec![key],
                    children: vec![left_pid, right_pid],
                };
                let (root_pid, mut guard) = self.buf.allocate_page(self.file)?;
                root.encode(&mut guard);
                drop(guard);
                self.buf.unpin_page(self.file, root_pid, true)?;

                self.set_parent(left_pid, root_pid)?;
                self.set_parent(right_pid, root_pid)?;

                self.root_page = root_pid;
                self.depth += 1;
                self.node_occupancy += 1;
                return Ok(());
            }

            let mut node = self.read_internal(parent_pid)?;
            let at = node.keys.partition_point(|k| *k <= key);
            node.keys.insert(at, key);
            node.children.insert(at + 1, right_pid);

            if node.keys.len() <= self.internal_fanout {
                self.write_internal(parent_pid, &node)?;
                self.node_occupancy += 1;
                return Ok(());
            }

            // Internal split: the middle key moves up, it lives in neither half
            let mid = node.keys.len() / 2;
            let promoted = node.keys[mid];
            let right_keys = node.keys.split_off(mid + 1);
            node.keys.pop();
            let right_children = node.children.split_off(mid + 1);

            let right = InternalNode {
                parent: node.parent,
                level: node.level,
                keys: right_keys,
                children: right_children,
            };
            let (new_pid, mut guard) = self.buf.allocate_page(self.file)?;
            right.encode(&mut guard);
            drop(guard);
            self.buf.unpin_page(self.file, new_pid, true)?;

            // Children that moved to the right half now answer to it
            for child in &right.children {
                self.set_parent(*child, new_pid)?;
            }

            let grandparent = node.parent;
            let level = node.level;
            self.write_internal(parent_pid, &node)?;

            left_pid = parent_pid;
            key = promoted;
            right_pid = new_pid;
            parent_pid = grandparent;
            child_level = Some(level);
        }
    }

    // ========================================================================
    // Page plumbing
    // ========================================================================

    pub(super) fn read_leaf(&self, pid: PageId) -> Result<LeafNode> {
        let guard = self.buf.fetch_page(self.file, pid)?;
        let node = LeafNode::decode(&guard, pid);
        drop(guard);
        self.buf.unpin_page(self.file, pid, false)?;
        node
    }

    fn read_internal(&self, pid: PageId) -> Result<InternalNode> {
        let guard = self.buf.fetch_page(self.file, pid)?;
        let node = InternalNode::decode(&guard, pid);
        drop(guard);
        self.buf.unpin_page(self.file, pid, false)?;
        node
    }

    fn write_leaf(&self, pid: PageId, node: &LeafNode) -> Result<()> {
        let mut guard = self.buf.fetch_page_mut(self.file, pid)?;
        node.encode(&mut guard);
        drop(guard);
        self.buf.unpin_page(self.file, pid, true)
    }

    fn write_internal(&self, pid: PageId, node: &InternalNode) -> Result<()> {
        let mut guard = self.buf.fetch_page_mut(self.file, pid)?;
        node.encode(&mut guard);
        drop(guard);
        self.buf.unpin_page(self.file, pid, true)
    }

    /// Re-point a node's parent back-link in place, whatever its kind.
    fn set_parent(&self, child: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.buf.fetch_page_mut(self.file, child)?;
        let offset = parent_offset(guard.header().page_type).ok_or(Error::PageCorrupted(child))?;
        guard.as_mut_slice()[offset..offset + 4].copy_from_slice(&parent.0.to_le_bytes());
        drop(guard);
        self.buf.unpin_page(self.file, child, true)
    }

    fn write_meta(&self) -> Result<()> {
        let meta = MetaRecord {
            relation_name: self.relation_name.clone(),
            attr_byte_offset: self.attr_byte_offset as u32,
            attr_type: self.attr_type as u8,
            root_page: self.root_page,
            depth: self.depth,
            leaf_fanout: self.leaf_fanout as u32,
            internal_fanout: self.internal_fanout as u32,
            leaf_occupancy: self.leaf_occupancy,
            node_occupancy: self.node_occupancy,
        };

        let mut guard = self.buf.fetch_page_mut(self.file, self.meta_page)?;
        meta.encode(&mut guard);
        drop(guard);
        self.buf.unpin_page(self.file, self.meta_page, true)
    }

    /// Accessors used by the scan module.
    pub(super) fn buf(&self) -> &'a BufferManager {
        self.buf
    }

    pub(super) fn file(&self) -> FileId {
        self.file
    }

    /// Shrink the fan-outs so split paths are reachable with few keys.
    #[cfg(test)]
    pub(super) fn set_fanouts(&mut self, leaf: usize, internal: usize) {
        assert!(leaf >= 2 && internal >= 2);
        self.leaf_fanout = leaf;
        self.internal_fanout = internal;
    }

    /// Walk the leaf chain from the leftmost leaf, collecting all keys.
    #[cfg(test)]
    pub(super) fn collect_all_keys(&self) -> Result<Vec<i32>> {
        let mut pid = self.find_leaf(i32::MIN)?;
        let mut keys = Vec::new();
        loop {
            let leaf = self.read_leaf(pid)?;
            keys.extend(leaf.entries.iter().map(|(k, _)| *k));
            if !leaf.right_sibling.is_valid() {
                return Ok(keys);
            }
            pid = leaf.right_sibling;
        }
    }
}

impl Drop for BTreeIndex<'_> {
    /// Best-effort close for indexes dropped without [`close`](Self::close):
    /// releases any scan pin, persists the meta record, and flushes.
    /// Errors cannot surface here and are ignored.
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.scan.is_some() {
            let _ = self.end_scan();
        }
        let _ = self.write_meta();
        let _ = self.buf.close_file(self.file);
    }
}

//! On-disk node formats and their owned in-memory decodings.
//!
//! Pages are never reinterpreted in place. Each node type has an explicit
//! `decode` that reads fields at fixed offsets into an owned value, and an
//! `encode` that writes them back; the page-type byte written by the page
//! header is the discriminator.

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, RecordId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

/// Maximum (key, record id) pairs a leaf page holds.
///
/// Leaf layout after the 8-byte page header:
/// ```text
/// 8   u16  size (entry count)
/// 10  u32  parent page id (INVALID when this node is the root)
/// 14  u32  right sibling page id (INVALID at end of chain)
/// 18  2    padding
/// 20  ...  entries: key i32, rid page u32, rid slot u16 (10 bytes each)
/// ```
pub const LEAF_FANOUT: usize = (PAGE_SIZE - LEAF_DATA) / LEAF_ENTRY_SIZE;

/// Maximum separator keys an internal page holds; it has one more child.
///
/// Internal layout after the 8-byte page header:
/// ```text
/// 8     u16  size (key count)
/// 10    u16  level (0 = children are leaves)
/// 12    u32  parent page id (INVALID when this node is the root)
/// 16    i32  keys[INTERNAL_FANOUT]
/// 2052  u32  children[INTERNAL_FANOUT + 1]
/// ```
pub const INTERNAL_FANOUT: usize = (PAGE_SIZE - INTERNAL_KEYS - 4) / 8;

const OFFSET_SIZE: usize = PageHeader::SIZE;

const LEAF_PARENT: usize = 10;
const LEAF_SIBLING: usize = 14;
const LEAF_DATA: usize = 20;
const LEAF_ENTRY_SIZE: usize = 10;

const INTERNAL_LEVEL: usize = 10;
const INTERNAL_PARENT: usize = 12;
const INTERNAL_KEYS: usize = 16;
const INTERNAL_CHILDREN: usize = INTERNAL_KEYS + 4 * INTERNAL_FANOUT;

/// Parent back-link field offset by node kind, for in-place re-pointing.
pub fn parent_offset(page_type: PageType) -> Option<usize> {
    match page_type {
        PageType::Leaf => Some(LEAF_PARENT),
        PageType::Internal => Some(INTERNAL_PARENT),
        _ => None,
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn write_u16(data: &mut [u8], at: usize, value: u16) {
    data[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn write_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn write_i32(data: &mut [u8], at: usize, value: i32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// A decoded leaf node: ordered (key, record id) entries plus its links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub parent: PageId,
    pub right_sibling: PageId,
    pub entries: Vec<(i32, RecordId)>,
}

impl LeafNode {
    pub fn new() -> Self {
        Self {
            parent: PageId::INVALID,
            right_sibling: PageId::INVALID,
            entries: Vec::new(),
        }
    }

    /// Decode a leaf from a page.
    ///
    /// # Errors
    /// `Error::PageCorrupted` if the page-type tag is not `Leaf`.
    pub fn decode(page: &Page, page_no: PageId) -> Result<Self> {
        if page.header().page_type != PageType::Leaf {
            return Err(Error::PageCorrupted(page_no));
        }

        let data = page.as_slice();
        let size = read_u16(data, OFFSET_SIZE) as usize;

        let mut entries = Vec::with_capacity(size);
        for i in 0..size {
            let at = LEAF_DATA + i * LEAF_ENTRY_SIZE;
            let key = read_i32(data, at);
            let rid = RecordId::new(PageId::new(read_u32(data, at + 4)), read_u16(data, at + 8));
            entries.push((key, rid));
        }

        Ok(Self {
            parent: PageId::new(read_u32(data, LEAF_PARENT)),
            right_sibling: PageId::new(read_u32(data, LEAF_SIBLING)),
            entries,
        })
    }

    /// Encode this leaf into a page, stamping the type tag.
    pub fn encode(&self, page: &mut Page) {
        debug_assert!(self.entries.len() <= LEAF_FANOUT);

        page.set_header(&PageHeader::new(PageType::Leaf));
        let data = page.as_mut_slice();
        write_u16(data, OFFSET_SIZE, self.entries.len() as u16);
        write_u32(data, LEAF_PARENT, self.parent.0);
        write_u32(data, LEAF_SIBLING, self.right_sibling.0);

        for (i, (key, rid)) in self.entries.iter().enumerate() {
            let at = LEAF_DATA + i * LEAF_ENTRY_SIZE;
            write_i32(data, at, *key);
            write_u32(data, at + 4, rid.page_no.0);
            write_u16(data, at + 8, rid.slot_no);
        }
    }
}

impl Default for LeafNode {
    fn default() -> Self {
        Self::new()
    }
}

/// A decoded internal node: separator keys plus one more child pointer.
///
/// `child[i]` covers keys below `key[i]`; the last child covers everything
/// from the last key up. Equal keys route right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub parent: PageId,
    /// Distance to the leaves: 0 means the children are leaf pages.
    pub level: u16,
    pub keys: Vec<i32>,
    pub children: Vec<PageId>,
}

impl InternalNode {
    /// Decode an internal node from a page.
    ///
    /// # Errors
    /// `Error::PageCorrupted` if the page-type tag is not `Internal`.
    pub fn decode(page: &Page, page_no: PageId) -> Result<Self> {
        if page.header().page_type != PageType::Internal {
            return Err(Error::PageCorrupted(page_no));
        }

        let data = page.as_slice();
        let size = read_u16(data, OFFSET_SIZE) as usize;

        let mut keys = Vec::with_capacity(size);
        for i in 0..size {
            keys.push(read_i32(data, INTERNAL_KEYS + i * 4));
        }
        let mut children = Vec::with_capacity(size + 1);
        for i in 0..=size {
            children.push(PageId::new(read_u32(data, INTERNAL_CHILDREN + i * 4)));
        }

        Ok(Self {
            parent: PageId::new(read_u32(data, INTERNAL_PARENT)),
            level: read_u16(data, INTERNAL_LEVEL),
            keys,
            children,
        })
    }

    /// Encode this node into a page, stamping the type tag.
    pub fn encode(&self, page: &mut Page) {
        debug_assert!(self.keys.len() <= INTERNAL_FANOUT);
        debug_assert_eq!(self.children.len(), self.keys.len() + 1);

        page.set_header(&PageHeader::new(PageType::Internal));
        let data = page.as_mut_slice();
        write_u16(data, OFFSET_SIZE, self.keys.len() as u16);
        write_u16(data, INTERNAL_LEVEL, self.level);
        write_u32(data, INTERNAL_PARENT, self.parent.0);

        for (i, key) in self.keys.iter().enumerate() {
            write_i32(data, INTERNAL_KEYS + i * 4, *key);
        }
        for (i, child) in self.children.iter().enumerate() {
            write_u32(data, INTERNAL_CHILDREN + i * 4, child.0);
        }
    }

    /// Child covering `key`: the child after the last separator `<= key`.
    pub fn child_for(&self, key: i32) -> PageId {
        let idx = self.keys.partition_point(|k| *k <= key);
        self.children[idx]
    }
}

/// The index meta record, persisted in the file's first page.
///
/// Written on creation and rewritten on close; an open validates the
/// identity fields against the construction arguments and adopts the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub relation_name: String,
    pub attr_byte_offset: u32,
    pub attr_type: u8,
    pub root_page: PageId,
    pub depth: u32,
    pub leaf_fanout: u32,
    pub internal_fanout: u32,
    /// Total entries across all leaves.
    pub leaf_occupancy: u32,
    /// Total separator keys across all internal nodes.
    pub node_occupancy: u32,
}

/// Longest relation name the meta record can hold.
pub const MAX_RELATION_NAME: usize = 64;

const META_NAME_LEN: usize = PageHeader::SIZE;
const META_NAME: usize = META_NAME_LEN + 2;
const META_ATTR_OFFSET: usize = META_NAME + MAX_RELATION_NAME;
const META_ATTR_TYPE: usize = META_ATTR_OFFSET + 4;
const META_ROOT: usize = META_ATTR_TYPE + 4;
const META_DEPTH: usize = META_ROOT + 4;
const META_LEAF_FANOUT: usize = META_DEPTH + 4;
const META_INTERNAL_FANOUT: usize = META_LEAF_FANOUT + 4;
const META_LEAF_OCC: usize = META_INTERNAL_FANOUT + 4;
const META_NODE_OCC: usize = META_LEAF_OCC + 4;

impl MetaRecord {
    /// Decode the meta record from a page.
    ///
    /// # Errors
    /// `Error::PageCorrupted` if the page-type tag is not `Meta`.
    pub fn decode(page: &Page, page_no: PageId) -> Result<Self> {
        if page.header().page_type != PageType::Meta {
            return Err(Error::PageCorrupted(page_no));
        }

        let data = page.as_slice();
        let name_len = (read_u16(data, META_NAME_LEN) as usize).min(MAX_RELATION_NAME);
        let relation_name = String::from_utf8_lossy(&data[META_NAME..META_NAME + name_len]).into_owned();

        Ok(Self {
            relation_name,
            attr_byte_offset: read_u32(data, META_ATTR_OFFSET),
            attr_type: data[META_ATTR_TYPE],
            root_page: PageId::new(read_u32(data, META_ROOT)),
            depth: read_u32(data, META_DEPTH),
            leaf_fanout: read_u32(data, META_LEAF_FANOUT),
            internal_fanout: read_u32(data, META_INTERNAL_FANOUT),
            leaf_occupancy: read_u32(data, META_LEAF_OCC),
            node_occupancy: read_u32(data, META_NODE_OCC),
        })
    }

    /// Encode this record into a page, stamping the type tag.
    pub fn encode(&self, page: &mut Page) {
        debug_assert!(self.relation_name.len() <= MAX_RELATION_NAME);

        page.set_header(&PageHeader::new(PageType::Meta));
        let data = page.as_mut_slice();

        let name = self.relation_name.as_bytes();
        write_u16(data, META_NAME_LEN, name.len() as u16);
        data[META_NAME..META_NAME + name.len()].copy_from_slice(name);

        write_u32(data, META_ATTR_OFFSET, self.attr_byte_offset);
        data[META_ATTR_TYPE] = self.attr_type;
        write_u32(data, META_ROOT, self.root_page.0);
        write_u32(data, META_DEPTH, self.depth);
        write_u32(data, META_LEAF_FANOUT, self.leaf_fanout);
        write_u32(data, META_INTERNAL_FANOUT, self.internal_fanout);
        write_u32(data, META_LEAF_OCC, self.leaf_occupancy);
        write_u32(data, META_NODE_OCC, self.node_occupancy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fanout_constants() {
        assert_eq!(LEAF_FANOUT, 407);
        assert_eq!(INTERNAL_FANOUT, 509);
        // Child array must fit inside the page
        assert!(INTERNAL_CHILDREN + 4 * (INTERNAL_FANOUT + 1) <= PAGE_SIZE);
        assert!(LEAF_DATA + LEAF_ENTRY_SIZE * LEAF_FANOUT <= PAGE_SIZE);
    }

    #[test]
    fn test_leaf_roundtrip() {
        let mut leaf = LeafNode::new();
        leaf.parent = PageId::new(7);
        leaf.right_sibling = PageId::new(9);
        for i in 0..LEAF_FANOUT as i32 {
            leaf.entries
                .push((i * 3, RecordId::new(PageId::new(i as u32), (i % 50) as u16)));
        }

        let mut page = Page::new();
        leaf.encode(&mut page);
        let decoded = LeafNode::decode(&page, PageId::new(1)).unwrap();
        assert_eq!(decoded, leaf);
    }

    #[test]
    fn test_empty_leaf_roundtrip() {
        let leaf = LeafNode::new();
        let mut page = Page::new();
        leaf.encode(&mut page);

        let decoded = LeafNode::decode(&page, PageId::new(1)).unwrap();
        assert!(decoded.entries.is_empty());
        assert!(!decoded.parent.is_valid());
        assert!(!decoded.right_sibling.is_valid());
    }

    #[test]
    fn test_internal_roundtrip() {
        let node = InternalNode {
            parent: PageId::INVALID,
            level: 2,
            keys: vec![10, 20, 30],
            children: vec![
                PageId::new(1),
                PageId::new(2),
                PageId::new(3),
                PageId::new(4),
            ],
        };

        let mut page = Page::new();
        node.encode(&mut page);
        let decoded = InternalNode::decode(&page, PageId::new(5)).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_child_for_routes_equal_keys_right() {
        let node = InternalNode {
            parent: PageId::INVALID,
            level: 0,
            keys: vec![10, 20],
            children: vec![PageId::new(1), PageId::new(2), PageId::new(3)],
        };

        assert_eq!(node.child_for(5), PageId::new(1));
        assert_eq!(node.child_for(9), PageId::new(1));
        assert_eq!(node.child_for(10), PageId::new(2)); // boundary routes right
        assert_eq!(node.child_for(15), PageId::new(2));
        assert_eq!(node.child_for(20), PageId::new(3));
        assert_eq!(node.child_for(1000), PageId::new(3));
    }

    #[test]
    fn test_decode_wrong_tag_fails() {
        let mut page = Page::new();
        LeafNode::new().encode(&mut page);

        assert!(matches!(
            InternalNode::decode(&page, PageId::new(2)),
            Err(Error::PageCorrupted(_))
        ));
        assert!(matches!(
            MetaRecord::decode(&page, PageId::new(2)),
            Err(Error::PageCorrupted(_))
        ));
        // Zeroed page decodes as nothing
        let blank = Page::new();
        assert!(LeafNode::decode(&blank, PageId::new(3)).is_err());
    }

    #[test]
    fn test_meta_roundtrip() {
        let meta = MetaRecord {
            relation_name: "employees".to_string(),
            attr_byte_offset: 12,
            attr_type: 0,
            root_page: PageId::new(1),
            depth: 2,
            leaf_fanout: LEAF_FANOUT as u32,
            internal_fanout: INTERNAL_FANOUT as u32,
            leaf_occupancy: 4096,
            node_occupancy: 17,
        };

        let mut page = Page::new();
        meta.encode(&mut page);
        let decoded = MetaRecord::decode(&page, PageId::new(0)).unwrap();
        assert_eq!(decoded, meta);
    }

    #[test]
    fn test_parent_offset_by_kind() {
        assert_eq!(parent_offset(PageType::Leaf), Some(LEAF_PARENT));
        assert_eq!(parent_offset(PageType::Internal), Some(INTERNAL_PARENT));
        assert_eq!(parent_offset(PageType::Meta), None);
        assert_eq!(parent_offset(PageType::Heap), None);
    }
}

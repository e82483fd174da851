//! Index structures.
//!
//! One index type is provided: a disk-resident B+ tree over a single
//! integer attribute of a heap relation, layered entirely on the buffer
//! manager.

pub mod btree;

pub use btree::{BTreeIndex, Operator, INTERNAL_FANOUT, LEAF_FANOUT};

/// Type of the indexed attribute.
///
/// Declared for all three types the catalog knows about, but only
/// [`AttrType::Int`] is implemented; constructing an index over the others
/// fails with `Error::BadIndexInfo`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Int = 0,
    Double = 1,
    Str = 2,
}

impl AttrType {
    /// Convert from the persisted tag byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(AttrType::Int),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::Str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_type_roundtrip() {
        for attr in [AttrType::Int, AttrType::Double, AttrType::Str] {
            assert_eq!(AttrType::from_u8(attr as u8), Some(attr));
        }
        assert_eq!(AttrType::from_u8(9), None);
    }
}

//! Page identifier type.

use std::fmt;

/// Identifies a page within one page file.
///
/// `u32` allows for 4 billion pages per file: 2^32 pages x 4KB = 16TB.
/// Page numbers are only unique within a file; the buffer manager keys its
/// page table by `(FileId, PageId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid/sentinel page ID.
    ///
    /// Used on disk to represent "no page": a leaf with no right sibling or
    /// a node with no parent stores this value in the corresponding slot.
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}

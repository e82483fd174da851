//! Record identifier type.

use std::fmt;

use crate::common::PageId;

/// Locates a record inside a relation: page number plus slot within the page.
///
/// Record ids are what an index stores against each key, so they must be
/// stable for the lifetime of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_no: PageId,
    pub slot_no: u16,
}

impl RecordId {
    #[inline]
    pub fn new(page_no: PageId, slot_no: u16) -> Self {
        Self { page_no, slot_no }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}, {})", self.page_no.0, self.slot_no)
    }
}

//! File identifier type.

use std::fmt;

/// Identifies a page file registered with the buffer manager.
///
/// The buffer manager hands one out when a file is opened or created;
/// every subsequent buffer operation names the file by this id. The id is
/// only meaningful within the buffer manager instance that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    /// Create a new FileId.
    #[inline]
    pub fn new(id: u32) -> Self {
        FileId(id)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File({})", self.0)
    }
}

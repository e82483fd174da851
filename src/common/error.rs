//! Error types for chalkdb.

use thiserror::Error;

use crate::common::{FileId, PageId};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in chalkdb.
///
/// A single crate-wide enum keeps error handling consistent across the
/// storage, buffer, and index layers. Variants map one-to-one onto the
/// failure conditions of the buffer manager and the B+ tree index.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying page file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page id does not exist in the page file.
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// A frame expected to hold valid data for a file does not, or a page
    /// failed its checksum on read.
    #[error("bad buffer: frame {frame} (dirty={dirty}, valid={valid}, refbit={refbit})")]
    BadBuffer {
        frame: usize,
        dirty: bool,
        valid: bool,
        refbit: bool,
    },

    /// A page failed its checksum on read, or decoded with an unexpected
    /// page-type tag.
    #[error("page {0} is corrupted")]
    PageCorrupted(PageId),

    /// Every frame in the buffer pool is pinned; no victim can be evicted.
    #[error("buffer pool exceeded: all {0} frames are pinned")]
    BufferExceeded(usize),

    /// Unpin was requested on a page whose pin count is already zero.
    #[error("page {page} of file {file} is not pinned")]
    PageNotPinned { file: FileId, page: PageId },

    /// An operation found a page that must first be unpinned.
    #[error("page {page} of file {file} is still pinned")]
    PagePinned { file: FileId, page: PageId },

    /// The file id is not registered with the buffer manager.
    #[error("file {0} is not open")]
    FileNotOpen(FileId),

    /// The index meta record does not match the construction arguments,
    /// or the requested attribute type is not supported.
    #[error("bad index info: {0}")]
    BadIndexInfo(String),

    /// Scan bounds were given with unsupported comparison operators.
    #[error("bad scan opcodes")]
    BadOpcodes,

    /// The scan low bound exceeds the high bound.
    #[error("bad scan range: low bound exceeds high bound")]
    BadScanRange,

    /// No entry in the index satisfies the requested low bound.
    #[error("no such key")]
    NoSuchKey,

    /// A scan operation was called with no scan in progress.
    #[error("scan not initialized")]
    ScanNotInitialized,

    /// The scan has no further qualifying entries. This is the normal
    /// termination signal for iteration, not a defect.
    #[error("scan completed")]
    ScanCompleted,
}

//! Configuration constants for chalkdb.

/// Size of a page in bytes (4KB).
///
/// Chosen to match the OS page size on most systems; every unit of I/O
/// between the page files and the buffer pool is exactly one page.
pub const PAGE_SIZE: usize = 4096;

/// Default number of frames in a buffer pool.
pub const DEFAULT_POOL_SIZE: usize = 128;

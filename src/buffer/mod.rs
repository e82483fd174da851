//! Buffer pool management.
//!
//! The buffer pool is the in-memory cache layer between the index/relation
//! code and the page files. It manages a fixed pool of frames, each holding
//! one page, and reclaims frames with a clock (second-chance) sweep.
//!
//! # Components
//! - [`BufferManager`] - the page cache: read/allocate/unpin/flush/dispose
//! - [`Frame`] / [`FrameMeta`] - a pool slot and its descriptor
//! - [`PageReadGuard`] / [`PageWriteGuard`] - lock guards for page access
//! - [`BufferPoolStats`] - hit/miss/eviction counters
//! - [`FrameSnapshot`] - diagnostic dump of frame occupancy

mod buffer_manager;
mod frame;
mod page_guard;
mod stats;

pub use buffer_manager::{BufferManager, FrameSnapshot};
pub use frame::{Frame, FrameMeta};
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use stats::{BufferPoolStats, StatsSnapshot};

//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the descriptor the clock algorithm
//! works over: which (file, page) is loaded, the pin count, the dirty flag,
//! and the reference bit that grants a second chance before eviction.

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FileId, PageId};
use crate::storage::page::Page;

/// Bookkeeping for one buffer frame.
///
/// Mutated only by the buffer manager, always under the frame's meta lock.
/// `valid == false` means the frame holds no page; `file`/`page_no` are
/// meaningless then and are reset together with the flag.
#[derive(Debug, Clone, Copy)]
pub struct FrameMeta {
    /// File that owns the cached page, if any.
    pub file: Option<FileId>,
    /// Page number within the owning file.
    pub page_no: PageId,
    /// Whether the frame holds a live page.
    pub valid: bool,
    /// Number of outstanding pins. The frame cannot be evicted while > 0.
    pub pin_count: u32,
    /// Whether the page was modified since it was loaded.
    pub dirty: bool,
    /// Reference bit: set on access, cleared by the clock sweep.
    pub refbit: bool,
}

impl FrameMeta {
    fn new() -> Self {
        Self {
            file: None,
            page_no: PageId::INVALID,
            valid: false,
            pin_count: 0,
            dirty: false,
            refbit: false,
        }
    }

    /// Install a newly loaded page: one pin, referenced, clean.
    pub fn set(&mut self, file: FileId, page_no: PageId) {
        self.file = Some(file);
        self.page_no = page_no;
        self.valid = true;
        self.pin_count = 1;
        self.dirty = false;
        self.refbit = true;
    }

    /// Reset the descriptor to the unowned state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Whether this frame currently caches a page of `file`.
    pub fn owned_by(&self, file: FileId) -> bool {
        self.file == Some(file)
    }
}

/// A frame in the buffer pool.
///
/// The page contents live behind an `RwLock` so callers can hold read or
/// write access through a guard while the descriptor stays lockable
/// independently (the clock sweep inspects descriptors without touching
/// page contents).
pub struct Frame {
    page: RwLock<Page>,
    meta: Mutex<FrameMeta>,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            meta: Mutex::new(FrameMeta::new()),
        }
    }

    /// Acquire read access to the page contents.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Acquire write access to the page contents.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Lock the frame descriptor.
    #[inline]
    pub fn meta(&self) -> MutexGuard<'_, FrameMeta> {
        self.meta.lock()
    }

    /// Copy of the descriptor, for diagnostics.
    pub fn meta_snapshot(&self) -> FrameMeta {
        *self.meta.lock()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_starts_invalid() {
        let frame = Frame::new();
        let meta = frame.meta_snapshot();
        assert!(!meta.valid);
        assert!(meta.file.is_none());
        assert_eq!(meta.pin_count, 0);
        assert!(!meta.dirty);
        assert!(!meta.refbit);
    }

    #[test]
    fn test_frame_set_and_clear() {
        let frame = Frame::new();

        {
            let mut meta = frame.meta();
            meta.set(FileId::new(1), PageId::new(7));
        }

        let meta = frame.meta_snapshot();
        assert!(meta.valid);
        assert!(meta.owned_by(FileId::new(1)));
        assert_eq!(meta.page_no, PageId::new(7));
        assert_eq!(meta.pin_count, 1);
        assert!(meta.refbit);
        assert!(!meta.dirty);

        frame.meta().clear();
        let meta = frame.meta_snapshot();
        assert!(!meta.valid);
        assert!(meta.file.is_none());
        assert_eq!(meta.page_no, PageId::INVALID);
    }

    #[test]
    fn test_frame_set_resets_dirty() {
        let frame = Frame::new();
        frame.meta().dirty = true;
        frame.meta().set(FileId::new(2), PageId::new(0));
        assert!(!frame.meta_snapshot().dirty);
    }

    #[test]
    fn test_frame_page_access() {
        let frame = Frame::new();

        frame.page_mut().as_mut_slice()[0] = 0xAB;
        assert_eq!(frame.page().as_slice()[0], 0xAB);
    }
}

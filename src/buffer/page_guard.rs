//! RAII guards for page access.
//!
//! [`PageReadGuard`] and [`PageWriteGuard`] give callers access to a pinned
//! page's contents. Dropping a guard releases only the frame's page lock:
//! the **pin stays in place** until the caller pairs the fetch with an
//! explicit [`BufferManager::unpin_page`](super::BufferManager::unpin_page).
//! That pairing is the crate's resource-lifetime discipline - the page
//! contents are only valid while pinned, and the dirty decision belongs to
//! whoever unpins.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FileId, FrameId, PageId};
use crate::storage::page::Page;

/// Shared access to a pinned page.
///
/// Multiple read guards may exist for the same page simultaneously.
pub struct PageReadGuard<'a> {
    file_id: FileId,
    page_id: PageId,
    frame_id: FrameId,
    lock: RwLockReadGuard<'a, Page>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        file_id: FileId,
        page_id: PageId,
        frame_id: FrameId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            file_id,
            page_id,
            frame_id,
            lock,
        }
    }

    /// File holding this page.
    #[inline]
    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Page number within the file.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Frame caching this page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

/// Exclusive access to a pinned page.
///
/// Mutating through this guard does not mark the page dirty by itself;
/// pass `dirty = true` to the matching `unpin_page` call.
pub struct PageWriteGuard<'a> {
    file_id: FileId,
    page_id: PageId,
    frame_id: FrameId,
    lock: RwLockWriteGuard<'a, Page>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        file_id: FileId,
        page_id: PageId,
        frame_id: FrameId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            file_id,
            page_id,
            frame_id,
            lock,
        }
    }

    /// File holding this page.
    #[inline]
    pub fn file_id(&self) -> FileId {
        self.file_id
    }

    /// Page number within the file.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Frame caching this page.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.lock
    }
}

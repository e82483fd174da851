//! Buffer Manager - the core page caching layer.
//!
//! The [`BufferManager`] provides:
//! - Page caching between page files and memory, keyed by `(FileId, PageId)`
//! - Pin-based reference counting with explicit unpin
//! - Dirty page write-back on eviction and flush
//! - Clock (second-chance) victim selection

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::{Error, FileId, FrameId, PageId, Result};
use crate::storage::PageFile;

/// Cursor of the clock sweep. Persists across calls.
struct ClockHand {
    hand: usize,
}

impl ClockHand {
    fn advance(&mut self, pool_size: usize) {
        self.hand = (self.hand + 1) % pool_size;
    }
}

/// Caches a bounded number of pages from one or more page files.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                       BufferManager                          │
/// │  ┌────────────────────┐  ┌───────────────────────────────┐  │
/// │  │ page_table         │  │      frames: Vec<Frame>       │  │
/// │  │(FileId,PageId)→Fid │─▶│ [Frame0] [Frame1] [Frame2] …  │  │
/// │  └────────────────────┘  └───────────────────────────────┘  │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────┐   │
/// │  │  clock hand  │  │    files     │  │      stats       │   │
/// │  │    Mutex     │  │ FileId→File  │  │     atomics      │   │
/// │  └──────────────┘  └──────────────┘  └──────────────────┘   │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Pin discipline
/// Every successful `fetch_page`/`fetch_page_mut`/`allocate_page` must be
/// paired with exactly one [`unpin_page`](Self::unpin_page). A page's
/// contents are valid only while its pin count is above zero; the clock
/// sweep never evicts a pinned frame.
///
/// # Concurrency posture
/// The engine is single-threaded by design. Interior mutability keeps every
/// method `&self`; the clock sweep and frame-table mutation each run under
/// one coarse critical section per call, which is also the locking a
/// multi-threaded port would need.
pub struct BufferManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Maps (file, page) to the frame caching it.
    page_table: RwLock<HashMap<(FileId, PageId), FrameId>>,

    /// Clock hand for victim selection.
    clock: Mutex<ClockHand>,

    /// Registry of open page files, so eviction can write back any victim.
    files: RwLock<HashMap<FileId, Mutex<PageFile>>>,

    /// Next file id to hand out.
    next_file_id: AtomicU32,

    /// Performance counters.
    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferManager {
    /// Create a buffer manager with `pool_size` frames.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            // The first advance lands on frame 0.
            clock: Mutex::new(ClockHand {
                hand: pool_size - 1,
            }),
            files: RwLock::new(HashMap::new()),
            next_file_id: AtomicU32::new(0),
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: file registry
    // ========================================================================

    /// Create a new page file and register it.
    pub fn create_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        Ok(self.register(PageFile::create(path)?))
    }

    /// Open an existing page file and register it.
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        Ok(self.register(PageFile::open(path)?))
    }

    /// Open a page file, creating it if it doesn't exist, and register it.
    pub fn open_or_create_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        Ok(self.register(PageFile::open_or_create(path)?))
    }

    /// Flush a file's resident pages and release its handle.
    ///
    /// # Errors
    /// Propagates [`flush_file`](Self::flush_file) failures (the file stays
    /// registered), or `Error::FileNotOpen` for an unknown id.
    pub fn close_file(&self, file: FileId) -> Result<()> {
        self.flush_file(file)?;
        self.files
            .write()
            .remove(&file)
            .map(|_| ())
            .ok_or(Error::FileNotOpen(file))
    }

    /// Id of the first live page of a registered file.
    pub fn first_page_id(&self, file: FileId) -> Result<Option<PageId>> {
        self.with_file(file, |pf| Ok(pf.first_page_id()))
    }

    fn register(&self, page_file: PageFile) -> FileId {
        let id = FileId::new(self.next_file_id.fetch_add(1, Ordering::Relaxed));
        self.files.write().insert(id, Mutex::new(page_file));
        id
    }

    fn with_file<R>(&self, file: FileId, op: impl FnOnce(&mut PageFile) -> Result<R>) -> Result<R> {
        let files = self.files.read();
        let page_file = files.get(&file).ok_or(Error::FileNotOpen(file))?;
        let mut page_file = page_file.lock();
        op(&mut page_file)
    }

    // ========================================================================
    // Public API: page access
    // ========================================================================

    /// Read a page, pinning it, with shared access to its contents.
    ///
    /// If the page is resident its reference bit is set and its pin count
    /// incremented. Otherwise the page is loaded from its file into a frame
    /// obtained by eviction.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist in the file
    /// - `Error::BufferExceeded` if every frame is pinned
    pub fn fetch_page(&self, file: FileId, page_no: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_frame(file, page_no)?;
        let lock = self.frames[frame_id.0].page();
        Ok(PageReadGuard::new(file, page_no, frame_id, lock))
    }

    /// Read a page, pinning it, with exclusive access to its contents.
    ///
    /// Same pin semantics as [`fetch_page`](Self::fetch_page). Mutations are
    /// recorded only when the matching `unpin_page` passes `dirty = true`.
    pub fn fetch_page_mut(&self, file: FileId, page_no: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_frame(file, page_no)?;
        let lock = self.frames[frame_id.0].page_mut();
        Ok(PageWriteGuard::new(file, page_no, frame_id, lock))
    }

    /// Allocate a new page in `file` and pin it in a fresh frame.
    ///
    /// Returns the new page number and a write guard over the
    /// zero-initialized contents.
    ///
    /// # Errors
    /// - `Error::BufferExceeded` if every frame is pinned
    /// - I/O errors from page allocation
    pub fn allocate_page(&self, file: FileId) -> Result<(PageId, PageWriteGuard<'_>)> {
        // Claim a frame first, as the reference implementation does; if the
        // file allocation fails the frame simply stays unowned.
        let frame_id = self.allocate_frame()?;
        let page_no = self.with_file(file, |pf| pf.allocate_page())?;

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        frame.meta().set(file, page_no);

        self.page_table
            .write()
            .insert((file, page_no), frame_id);

        let lock = frame.page_mut();
        Ok((page_no, PageWriteGuard::new(file, page_no, frame_id, lock)))
    }

    /// Unpin a page, optionally marking it dirty.
    ///
    /// Does nothing if the page is not resident. The dirty flag is sticky:
    /// once set it is cleared only by write-back.
    ///
    /// # Errors
    /// `Error::PageNotPinned` if the pin count is already zero (state is
    /// left untouched).
    pub fn unpin_page(&self, file: FileId, page_no: PageId, dirty: bool) -> Result<()> {
        let frame_id = {
            let table = self.page_table.read();
            match table.get(&(file, page_no)) {
                Some(&fid) => fid,
                None => return Ok(()),
            }
        };

        let mut meta = self.frames[frame_id.0].meta();
        if meta.pin_count == 0 {
            return Err(Error::PageNotPinned {
                file,
                page: page_no,
            });
        }
        meta.pin_count -= 1;
        if dirty {
            meta.dirty = true;
        }
        Ok(())
    }

    /// Write back all of `file`'s dirty resident pages and drop them from
    /// the pool.
    ///
    /// Frames are checked and processed one at a time in frame order:
    /// a pinned or invalid frame aborts the call, but pages already written
    /// for earlier frames are not rolled back (reference behavior).
    ///
    /// # Errors
    /// - `Error::PagePinned` if a matching frame still has pins
    /// - `Error::BadBuffer` if a matching frame is marked invalid
    pub fn flush_file(&self, file: FileId) -> Result<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            let mut meta = frame.meta();
            if !meta.owned_by(file) {
                continue;
            }
            if !meta.valid {
                return Err(Error::BadBuffer {
                    frame: i,
                    dirty: meta.dirty,
                    valid: meta.valid,
                    refbit: meta.refbit,
                });
            }
            if meta.pin_count > 0 {
                return Err(Error::PagePinned {
                    file,
                    page: meta.page_no,
                });
            }

            if meta.dirty {
                let mut page = frame.page_mut();
                page.update_checksum();
                self.with_file(file, |pf| pf.write_page(meta.page_no, &page))?;
                meta.dirty = false;
                self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
            }

            self.page_table.write().remove(&(file, meta.page_no));
            meta.clear();
        }
        Ok(())
    }

    /// Drop a page from the pool (if resident) and delete it from its file.
    ///
    /// No pin-count check is made; callers are responsible for not disposing
    /// pinned pages. Does nothing at all if the page is not resident.
    pub fn dispose_page(&self, file: FileId, page_no: PageId) -> Result<()> {
        let frame_id = {
            let mut table = self.page_table.write();
            match table.remove(&(file, page_no)) {
                Some(fid) => fid,
                None => return Ok(()),
            }
        };

        self.frames[frame_id.0].meta().clear();
        self.with_file(file, |pf| pf.delete_page(page_no))
    }

    // ========================================================================
    // Public API: diagnostics
    // ========================================================================

    /// Buffer pool statistics.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Number of frames in the pool.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Whether a page is currently cached in some frame.
    pub fn is_resident(&self, file: FileId, page_no: PageId) -> bool {
        self.page_table.read().contains_key(&(file, page_no))
    }

    /// Snapshot of every frame's occupancy, for debugging.
    pub fn dump(&self) -> Vec<FrameSnapshot> {
        self.frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let meta = frame.meta_snapshot();
                FrameSnapshot {
                    frame: i,
                    file: meta.file,
                    page_no: meta.page_no,
                    valid: meta.valid,
                    pin_count: meta.pin_count,
                    dirty: meta.dirty,
                    refbit: meta.refbit,
                }
            })
            .collect()
    }

    // ========================================================================
    // Internal: fetch and eviction
    // ========================================================================

    /// Pin the frame holding (file, page_no), loading the page on a miss.
    fn fetch_frame(&self, file: FileId, page_no: PageId) -> Result<FrameId> {
        {
            let table = self.page_table.read();
            if let Some(&frame_id) = table.get(&(file, page_no)) {
                let mut meta = self.frames[frame_id.0].meta();
                meta.refbit = true;
                meta.pin_count += 1;
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(frame_id);
            }
        }

        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Read from disk before claiming a frame, so a missing page id
        // leaves the pool untouched.
        let page = self.with_file(file, |pf| pf.read_page(page_no))?;
        self.stats.pages_read.fetch_add(1, Ordering::Relaxed);

        let frame_id = self.allocate_frame()?;
        let frame = &self.frames[frame_id.0];
        frame
            .page_mut()
            .as_mut_slice()
            .copy_from_slice(page.as_slice());
        frame.meta().set(file, page_no);

        self.page_table
            .write()
            .insert((file, page_no), frame_id);

        Ok(frame_id)
    }

    /// Obtain a free frame via the clock sweep.
    ///
    /// The hand advances before each inspection. An invalid frame is claimed
    /// immediately; a referenced frame loses its reference bit and gets a
    /// second chance; a pinned frame is skipped. After one full revolution
    /// every reference bit has been cleared, so a second revolution that
    /// still finds no victim proves every valid frame is pinned.
    fn allocate_frame(&self) -> Result<FrameId> {
        let mut clock = self.clock.lock();

        for _ in 0..(2 * self.pool_size) {
            clock.advance(self.pool_size);
            let frame_id = FrameId::new(clock.hand);
            let frame = &self.frames[frame_id.0];
            let mut meta = frame.meta();

            if !meta.valid {
                return Ok(frame_id);
            }
            if meta.refbit {
                meta.refbit = false;
                continue;
            }
            if meta.pin_count > 0 {
                continue;
            }

            // Victim found: write back if dirty, then clear the slot.
            let owner = match meta.file {
                Some(owner) => owner,
                None => {
                    // Valid frame without an owner cannot happen through this
                    // API; reclaim it rather than looping on it.
                    meta.clear();
                    return Ok(frame_id);
                }
            };

            if meta.dirty {
                let mut page = frame.page_mut();
                page.update_checksum();
                self.with_file(owner, |pf| pf.write_page(meta.page_no, &page))?;
                meta.dirty = false;
                self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
            }

            self.page_table.write().remove(&(owner, meta.page_no));
            meta.clear();
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            return Ok(frame_id);
        }

        Err(Error::BufferExceeded(self.pool_size))
    }
}

impl Drop for BufferManager {
    /// Best-effort write-back of every dirty frame, ignoring pins and
    /// errors, so nothing prevents releasing the pool (reference destructor
    /// behavior).
    fn drop(&mut self) {
        for frame in &self.frames {
            let mut meta = frame.meta();
            if !(meta.valid && meta.dirty) {
                continue;
            }
            if let Some(owner) = meta.file {
                let mut page = frame.page_mut();
                page.update_checksum();
                let _ = self.with_file(owner, |pf| pf.write_page(meta.page_no, &page));
                meta.dirty = false;
            }
        }
    }
}

/// Occupancy of one frame, as reported by [`BufferManager::dump`].
#[derive(Debug, Clone, Copy)]
pub struct FrameSnapshot {
    pub frame: usize,
    pub file: Option<FileId>,
    pub page_no: PageId,
    pub valid: bool,
    pub pin_count: u32,
    pub dirty: bool,
    pub refbit: bool,
}

impl fmt::Display for FrameSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            Some(file) => write!(
                f,
                "frame {}: {} {} pin={} dirty={} refbit={} valid={}",
                self.frame,
                file,
                self.page_no,
                self.pin_count,
                self.dirty,
                self.refbit,
                self.valid
            ),
            None => write!(f, "frame {}: <empty>", self.frame),
        }
    }
}

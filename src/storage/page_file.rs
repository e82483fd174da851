//! Page file - the persistent page container.
//!
//! A [`PageFile`] stores fixed-size pages inside one named file and hands
//! them out by numeric id. It is deliberately thin: the buffer manager is
//! the only caller during normal operation and is responsible for caching,
//! pinning, and write-back ordering.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Persists fixed-size pages inside a single named file.
///
/// # File Layout
/// Pages are laid out sequentially; page N lives at offset `N * PAGE_SIZE`.
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │  ...    │ Page N  │
/// └─────────┴─────────┴─────────┴─────────┘
/// ```
///
/// # Deleted pages
/// `delete_page` retires an id: reads and writes of it fail with
/// `PageNotFound` until a later `allocate_page` reuses the slot. The free-id
/// set is kept in memory only; crash durability of deletions is out of scope.
///
/// # Thread Safety
/// `PageFile` is single-threaded. The buffer manager serializes access.
pub struct PageFile {
    file: File,
    path: PathBuf,
    /// Number of pages ever allocated in the file, including freed slots.
    page_count: u32,
    /// Ids retired by `delete_page`, available for reuse.
    freed: BTreeSet<u32>,
}

impl PageFile {
    /// Create a new page file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            page_count: 0,
            freed: BTreeSet::new(),
        })
    }

    /// Open an existing page file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        // Page count follows from the file size
        let metadata = file.metadata()?;
        let page_count = (metadata.len() / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            page_count,
            freed: BTreeSet::new(),
        })
    }

    /// Open an existing page file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Check whether a page file exists at the given path.
    pub fn exists<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref().is_file()
    }

    /// Path this file was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the first live page, or `None` for an empty file.
    pub fn first_page_id(&self) -> Option<PageId> {
        (0..self.page_count)
            .find(|id| !self.freed.contains(id))
            .map(PageId::new)
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the id was never allocated or was deleted
    /// - `Error::PageCorrupted` if the stored checksum does not match
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        if !self.is_live(page_id) {
            return Err(Error::PageNotFound(page_id));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;

        if !page.verify_checksum() {
            return Err(Error::PageCorrupted(page_id));
        }

        Ok(page)
    }

    /// Write a page to disk.
    ///
    /// The page must have been previously allocated with `allocate_page`.
    /// The caller is expected to have refreshed the page checksum
    /// ([`Page::update_checksum`]) before writing.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the id is not live.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        if !self.is_live(page_id) {
            return Err(Error::PageNotFound(page_id));
        }

        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(page.as_slice())?;

        Ok(())
    }

    /// Allocate a new page, reusing a freed slot when one exists.
    ///
    /// Returns the `PageId` of the newly allocated page. The page contents
    /// on disk are zero-filled.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = match self.freed.iter().next().copied() {
            Some(reused) => {
                self.freed.remove(&reused);
                PageId::new(reused)
            }
            None => {
                let id = PageId::new(self.page_count);
                self.page_count += 1;
                id
            }
        };

        // Zero-fill the slot so stale contents never leak
        let offset = (page_id.0 as u64) * (PAGE_SIZE as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        let zeros = [0u8; PAGE_SIZE];
        self.file.write_all(&zeros)?;

        Ok(page_id)
    }

    /// Delete a page, retiring its id until a later allocation reuses it.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the id is not live.
    pub fn delete_page(&mut self, page_id: PageId) -> Result<()> {
        if !self.is_live(page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        self.freed.insert(page_id.0);
        Ok(())
    }

    /// Flush file contents to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Number of allocated page slots (including freed ones).
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    fn is_live(&self, page_id: PageId) -> bool {
        page_id.is_valid() && page_id.0 < self.page_count && !self.freed.contains(&page_id.0)
    }
}

//! Heap relation - an unordered file of variable-length records.
//!
//! A [`Relation`] chains heap pages together through a next-page link and
//! appends records front-to-back. It exists so an index can be bulk-built
//! from the records of the relation it indexes; full table management
//! (updates, deletes, catalogs) is out of scope.

use std::path::{Path, PathBuf};

use crate::buffer::BufferManager;
use crate::common::config::PAGE_SIZE;
use crate::common::{Error, FileId, PageId, RecordId, Result};
use crate::storage::page::{Page, PageHeader, PageType};

// Heap page layout, after the 8-byte page header:
//   8   u32  next page id (PageId::INVALID terminates the chain)
//   12  u16  slot count
//   14  u16  free offset (where the next record goes)
//   16  ...  records, each a u16 length prefix followed by the payload
const OFFSET_NEXT_PAGE: usize = PageHeader::SIZE;
const OFFSET_SLOT_COUNT: usize = OFFSET_NEXT_PAGE + 4;
const OFFSET_FREE: usize = OFFSET_SLOT_COUNT + 2;
const DATA_START: usize = OFFSET_FREE + 2;

/// Largest record a heap page can hold.
pub const MAX_RECORD_SIZE: usize = PAGE_SIZE - DATA_START - 2;

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn write_u16(data: &mut [u8], at: usize, value: u16) {
    data[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn write_u32(data: &mut [u8], at: usize, value: u32) {
    data[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn init_heap_page(page: &mut Page) {
    page.reset();
    page.set_header(&PageHeader::new(PageType::Heap));
    let data = page.as_mut_slice();
    write_u32(data, OFFSET_NEXT_PAGE, PageId::INVALID.0);
    write_u16(data, OFFSET_SLOT_COUNT, 0);
    write_u16(data, OFFSET_FREE, DATA_START as u16);
}

fn next_page(page: &Page) -> PageId {
    PageId::new(read_u32(page.as_slice(), OFFSET_NEXT_PAGE))
}

fn slot_count(page: &Page) -> u16 {
    read_u16(page.as_slice(), OFFSET_SLOT_COUNT)
}

/// Append a record, returning its slot, or `None` if the page is full.
fn append_record(page: &mut Page, record: &[u8]) -> Option<u16> {
    let data = page.as_mut_slice();
    let free = read_u16(data, OFFSET_FREE) as usize;
    if free + 2 + record.len() > PAGE_SIZE {
        return None;
    }

    let slot = read_u16(data, OFFSET_SLOT_COUNT);
    write_u16(data, free, record.len() as u16);
    data[free + 2..free + 2 + record.len()].copy_from_slice(record);
    write_u16(data, OFFSET_FREE, (free + 2 + record.len()) as u16);
    write_u16(data, OFFSET_SLOT_COUNT, slot + 1);
    Some(slot)
}

/// Walk the length prefixes to find a slot's payload.
fn record_at(page: &Page, slot: u16) -> Option<Vec<u8>> {
    if slot >= slot_count(page) {
        return None;
    }
    let data = page.as_slice();
    let mut at = DATA_START;
    for _ in 0..slot {
        at += 2 + read_u16(data, at) as usize;
    }
    let len = read_u16(data, at) as usize;
    Some(data[at + 2..at + 2 + len].to_vec())
}

/// An append-only heap file of records, layered on the buffer manager.
pub struct Relation<'a> {
    buf: &'a BufferManager,
    file: FileId,
    name: String,
    path: PathBuf,
    /// Tail of the page chain, where appends go. `None` while empty.
    last_page: Option<PageId>,
}

impl<'a> Relation<'a> {
    /// Create a new, empty relation file.
    pub fn create<P: AsRef<Path>>(buf: &'a BufferManager, path: P) -> Result<Self> {
        let file = buf.create_file(&path)?;
        Ok(Self {
            buf,
            file,
            name: Self::stem(path.as_ref()),
            path: path.as_ref().to_path_buf(),
            last_page: None,
        })
    }

    /// Open an existing relation file, locating the tail of the page chain.
    pub fn open<P: AsRef<Path>>(buf: &'a BufferManager, path: P) -> Result<Self> {
        let file = buf.open_file(&path)?;

        let mut last_page = buf.first_page_id(file)?;
        if let Some(mut current) = last_page {
            loop {
                let guard = buf.fetch_page(file, current)?;
                let next = next_page(&guard);
                drop(guard);
                buf.unpin_page(file, current, false)?;

                if !next.is_valid() {
                    break;
                }
                current = next;
            }
            last_page = Some(current);
        }

        Ok(Self {
            buf,
            file,
            name: Self::stem(path.as_ref()),
            path: path.as_ref().to_path_buf(),
            last_page,
        })
    }

    fn stem(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Name of the relation (the file stem), used to derive index file names.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer file id of the backing file.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Append a record, returning the id it can be fetched by.
    ///
    /// # Errors
    /// Rejects records larger than [`MAX_RECORD_SIZE`].
    pub fn insert_record(&mut self, record: &[u8]) -> Result<RecordId> {
        if record.len() > MAX_RECORD_SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "record exceeds heap page capacity",
            )));
        }

        // Try the tail page first
        if let Some(tail) = self.last_page {
            let mut guard = self.buf.fetch_page_mut(self.file, tail)?;
            let slot = append_record(&mut guard, record);
            drop(guard);
            self.buf.unpin_page(self.file, tail, slot.is_some())?;

            if let Some(slot) = slot {
                return Ok(RecordId::new(tail, slot));
            }
        }

        // Grow the chain by one page
        let (new_page_no, mut guard) = self.buf.allocate_page(self.file)?;
        init_heap_page(&mut guard);
        let slot = append_record(&mut guard, record);
        drop(guard);
        self.buf.unpin_page(self.file, new_page_no, true)?;

        if let Some(old_tail) = self.last_page {
            let mut guard = self.buf.fetch_page_mut(self.file, old_tail)?;
            write_u32(guard.as_mut_slice(), OFFSET_NEXT_PAGE, new_page_no.0);
            drop(guard);
            self.buf.unpin_page(self.file, old_tail, true)?;
        }
        self.last_page = Some(new_page_no);

        // A fresh page always fits a MAX_RECORD_SIZE record
        debug_assert!(slot.is_some());
        Ok(RecordId::new(new_page_no, slot.unwrap_or(0)))
    }

    /// Fetch a single record by id.
    ///
    /// # Errors
    /// `Error::PageNotFound` for an unknown slot or page.
    pub fn read_record(&self, rid: RecordId) -> Result<Vec<u8>> {
        let guard = self.buf.fetch_page(self.file, rid.page_no)?;
        let record = record_at(&guard, rid.slot_no);
        drop(guard);
        self.buf.unpin_page(self.file, rid.page_no, false)?;

        record.ok_or(Error::PageNotFound(rid.page_no))
    }

    /// Start a sequential scan over all records, in insertion order.
    pub fn scan(&self) -> Result<RelationScan<'a>> {
        Ok(RelationScan {
            buf: self.buf,
            file: self.file,
            current_page: self.buf.first_page_id(self.file)?,
            next_slot: 0,
        })
    }

    /// Flush the relation's pages and release its file handle.
    pub fn close(self) -> Result<()> {
        self.buf.close_file(self.file)
    }
}

/// Cursor over a relation's records, front to back.
///
/// End of data is signalled by `Ok(None)`, distinct from real errors.
pub struct RelationScan<'a> {
    buf: &'a BufferManager,
    file: FileId,
    current_page: Option<PageId>,
    next_slot: u16,
}

impl RelationScan<'_> {
    /// Advance to the next record, or `Ok(None)` when the relation is
    /// exhausted.
    pub fn next_record(&mut self) -> Result<Option<(RecordId, Vec<u8>)>> {
        loop {
            let page_no = match self.current_page {
                Some(p) => p,
                None => return Ok(None),
            };

            let guard = self.buf.fetch_page(self.file, page_no)?;
            let result = if self.next_slot < slot_count(&guard) {
                record_at(&guard, self.next_slot)
            } else {
                None
            };
            let next = next_page(&guard);
            drop(guard);
            self.buf.unpin_page(self.file, page_no, false)?;

            match result {
                Some(record) => {
                    let rid = RecordId::new(page_no, self.next_slot);
                    self.next_slot += 1;
                    return Ok(Some((rid, record)));
                }
                None => {
                    // Page exhausted; hop to the next in the chain
                    self.current_page = next.is_valid().then_some(next);
                    self.next_slot = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (BufferManager, tempfile::TempDir) {
        (BufferManager::new(16), tempdir().unwrap())
    }

    #[test]
    fn test_insert_and_read() {
        let (bm, dir) = setup();
        let mut rel = Relation::create(&bm, dir.path().join("emp.rel")).unwrap();
        assert_eq!(rel.name(), "emp");

        let r1 = rel.insert_record(b"alice").unwrap();
        let r2 = rel.insert_record(b"bob").unwrap();
        assert_ne!(r1, r2);

        assert_eq!(rel.read_record(r1).unwrap(), b"alice");
        assert_eq!(rel.read_record(r2).unwrap(), b"bob");
    }

    #[test]
    fn test_read_bad_slot() {
        let (bm, dir) = setup();
        let mut rel = Relation::create(&bm, dir.path().join("emp.rel")).unwrap();
        let rid = rel.insert_record(b"x").unwrap();

        let bogus = RecordId::new(rid.page_no, 99);
        assert!(matches!(
            rel.read_record(bogus),
            Err(Error::PageNotFound(_))
        ));
    }

    #[test]
    fn test_record_too_large() {
        let (bm, dir) = setup();
        let mut rel = Relation::create(&bm, dir.path().join("emp.rel")).unwrap();
        let huge = vec![0u8; MAX_RECORD_SIZE + 1];
        assert!(rel.insert_record(&huge).is_err());
    }

    #[test]
    fn test_scan_in_insertion_order() {
        let (bm, dir) = setup();
        let mut rel = Relation::create(&bm, dir.path().join("emp.rel")).unwrap();

        // Spill across several pages: 300-byte records, ~13 per page
        let mut rids = Vec::new();
        for i in 0..50u32 {
            let mut record = vec![0u8; 300];
            record[..4].copy_from_slice(&i.to_le_bytes());
            rids.push(rel.insert_record(&record).unwrap());
        }
        assert!(rids.last().unwrap().page_no.0 > 0, "expected page spill");

        let mut scan = rel.scan().unwrap();
        for (i, expected_rid) in rids.iter().enumerate() {
            let (rid, record) = scan.next_record().unwrap().unwrap();
            assert_eq!(rid, *expected_rid);
            assert_eq!(u32::from_le_bytes(record[..4].try_into().unwrap()), i as u32);
        }
        assert!(scan.next_record().unwrap().is_none());
        // Exhausted scans stay exhausted
        assert!(scan.next_record().unwrap().is_none());
    }

    #[test]
    fn test_scan_empty_relation() {
        let (bm, dir) = setup();
        let rel = Relation::create(&bm, dir.path().join("empty.rel")).unwrap();
        let mut scan = rel.scan().unwrap();
        assert!(scan.next_record().unwrap().is_none());
    }

    #[test]
    fn test_reopen_appends_at_tail() {
        let (bm, dir) = setup();
        let path = dir.path().join("emp.rel");

        {
            let mut rel = Relation::create(&bm, &path).unwrap();
            for i in 0..30u32 {
                let mut record = vec![0u8; 300];
                record[..4].copy_from_slice(&i.to_le_bytes());
                rel.insert_record(&record).unwrap();
            }
            rel.close().unwrap();
        }

        let mut rel = Relation::open(&bm, &path).unwrap();
        let mut record = vec![0u8; 300];
        record[..4].copy_from_slice(&30u32.to_le_bytes());
        rel.insert_record(&record).unwrap();

        let mut scan = rel.scan().unwrap();
        let mut seen = 0u32;
        while let Some((_, record)) = scan.next_record().unwrap() {
            assert_eq!(u32::from_le_bytes(record[..4].try_into().unwrap()), seen);
            seen += 1;
        }
        assert_eq!(seen, 31);
    }
}

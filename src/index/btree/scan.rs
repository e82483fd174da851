//! Range scans over the leaf chain.
//!
//! A scan is a cursor owned by its index: at most one per index instance.
//! While positioned on a leaf the cursor holds that leaf's pin; the pin
//! moves with sibling hops and is released by `end_scan` (or the index
//! destructor).

use crate::common::{Error, PageId, RecordId, Result};
use crate::index::btree::index::BTreeIndex;
use crate::index::btree::node::LeafNode;

/// Comparison operator for a scan bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// Cursor state of an active scan.
#[derive(Debug, Clone, Copy)]
pub(super) struct ScanState {
    low: i32,
    low_op: Operator,
    high: i32,
    high_op: Operator,
    /// Leaf the cursor is on; the cursor holds one pin on it.
    current_page: PageId,
    /// Index of the next unread entry in that leaf.
    next_entry: usize,
}

impl BTreeIndex<'_> {
    /// Begin a range scan over `[low, high]` as qualified by the operators.
    ///
    /// The low operator must be `Gt` or `Gte` and the high operator `Lt` or
    /// `Lte`. An already-active scan is implicitly ended first. On success
    /// the cursor is positioned (and pinned) at the first entry satisfying
    /// the low bound.
    ///
    /// # Errors
    /// - `Error::BadOpcodes` for any other operator combination
    /// - `Error::BadScanRange` if `low > high`
    /// - `Error::NoSuchKey` if no entry satisfies the low bound
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: Operator,
        high: i32,
        high_op: Operator,
    ) -> Result<()> {
        if !matches!(low_op, Operator::Gt | Operator::Gte)
            || !matches!(high_op, Operator::Lt | Operator::Lte)
        {
            return Err(Error::BadOpcodes);
        }
        if low > high {
            return Err(Error::BadScanRange);
        }
        if self.scan.is_some() {
            self.end_scan()?;
        }

        let buf = self.buf();
        let file = self.file();

        let mut pid = self.find_leaf(low)?;
        loop {
            // Pin the leaf; on success the cursor keeps this pin
            let guard = buf.fetch_page(file, pid)?;
            let leaf = LeafNode::decode(&guard, pid);
            drop(guard);
            let leaf = match leaf {
                Ok(leaf) => leaf,
                Err(err) => {
                    let _ = buf.unpin_page(file, pid, false);
                    return Err(err);
                }
            };

            let at = leaf.entries.partition_point(|(k, _)| match low_op {
                Operator::Gte => *k < low,
                _ => *k <= low,
            });
            if at < leaf.entries.len() {
                self.scan = Some(ScanState {
                    low,
                    low_op,
                    high,
                    high_op,
                    current_page: pid,
                    next_entry: at,
                });
                return Ok(());
            }

            // Leaf exhausted before a match; hop right
            let next = leaf.right_sibling;
            buf.unpin_page(file, pid, false)?;
            if !next.is_valid() {
                return Err(Error::NoSuchKey);
            }
            pid = next;
        }
    }

    /// Return the record id at the cursor and advance it.
    ///
    /// # Errors
    /// - `Error::ScanNotInitialized` if no scan is active
    /// - `Error::ScanCompleted` when the cursor entry violates the high
    ///   bound or the leaf chain is exhausted (the normal end of iteration;
    ///   the scan stays active until `end_scan`)
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let buf = self.buf();
        let file = self.file();
        let state = self.scan.as_mut().ok_or(Error::ScanNotInitialized)?;

        loop {
            let guard = buf.fetch_page(file, state.current_page)?;
            let leaf = LeafNode::decode(&guard, state.current_page);
            drop(guard);
            buf.unpin_page(file, state.current_page, false)?;
            let leaf = leaf?;

            if state.next_entry < leaf.entries.len() {
                let (key, rid) = leaf.entries[state.next_entry];
                let in_range = match state.high_op {
                    Operator::Lte => key <= state.high,
                    _ => key < state.high,
                };
                if !in_range {
                    return Err(Error::ScanCompleted);
                }
                debug_assert!(match state.low_op {
                    Operator::Gte => key >= state.low,
                    _ => key > state.low,
                });
                state.next_entry += 1;
                return Ok(rid);
            }

            let next = leaf.right_sibling;
            if !next.is_valid() {
                return Err(Error::ScanCompleted);
            }

            // Pin the sibling before releasing the current leaf, then move
            let guard = buf.fetch_page(file, next)?;
            drop(guard);
            buf.unpin_page(file, state.current_page, false)?;
            state.current_page = next;
            state.next_entry = 0;
        }
    }

    /// End the active scan, releasing the cursor's pin.
    ///
    /// # Errors
    /// `Error::ScanNotInitialized` if no scan is active.
    pub fn end_scan(&mut self) -> Result<()> {
        let state = self.scan.take().ok_or(Error::ScanNotInitialized)?;
        self.buf().unpin_page(self.file(), state.current_page, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::index::AttrType;
    use crate::storage::Relation;
    use tempfile::{tempdir, TempDir};

    /// Buffer manager plus an empty relation file for the index to cover.
    fn setup() -> (BufferManager, TempDir) {
        let bm = BufferManager::new(64);
        let dir = tempdir().unwrap();
        Relation::create(&bm, dir.path().join("emp.rel")).unwrap();
        (bm, dir)
    }

    /// Open the relation and build an index over the given keys; each key's
    /// record id encodes the key for verification.
    fn open_index<'a>(
        bm: &'a BufferManager,
        dir: &TempDir,
        keys: &[i32],
    ) -> (Relation<'a>, BTreeIndex<'a>) {
        let rel = Relation::open(bm, dir.path().join("emp.rel")).unwrap();
        let mut index = BTreeIndex::new(bm, &rel, 0, AttrType::Int).unwrap();
        for &key in keys {
            index
                .insert_entry(key, RecordId::new(PageId::new(key as u32), 0))
                .unwrap();
        }
        (rel, index)
    }

    fn collect_scan(index: &mut BTreeIndex<'_>) -> Vec<i32> {
        let mut keys = Vec::new();
        loop {
            match index.scan_next() {
                Ok(rid) => keys.push(rid.page_no.0 as i32),
                Err(Error::ScanCompleted) => return keys,
                Err(err) => panic!("unexpected scan error: {}", err),
            }
        }
    }

    const KEYS: [i32; 5] = [1, 5, 9, 15, 20];

    #[test]
    fn test_inclusive_range() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        index.start_scan(5, Operator::Gte, 15, Operator::Lte).unwrap();
        assert_eq!(collect_scan(&mut index), vec![5, 9, 15]);
        // Exhausted scans keep reporting completion
        assert!(matches!(index.scan_next(), Err(Error::ScanCompleted)));
        index.end_scan().unwrap();
    }

    #[test]
    fn test_exclusive_range() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        index.start_scan(5, Operator::Gt, 15, Operator::Lt).unwrap();
        assert_eq!(collect_scan(&mut index), vec![9]);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_no_such_key() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        assert!(matches!(
            index.start_scan(100, Operator::Gte, 200, Operator::Lte),
            Err(Error::NoSuchKey)
        ));
        // Failed start leaves no scan behind
        assert!(matches!(index.scan_next(), Err(Error::ScanNotInitialized)));
    }

    #[test]
    fn test_bad_range() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        assert!(matches!(
            index.start_scan(10, Operator::Gt, 5, Operator::Lte),
            Err(Error::BadScanRange)
        ));
    }

    #[test]
    fn test_bad_opcodes() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        assert!(matches!(
            index.start_scan(5, Operator::Lt, 15, Operator::Lte),
            Err(Error::BadOpcodes)
        ));
        assert!(matches!(
            index.start_scan(5, Operator::Gte, 15, Operator::Gt),
            Err(Error::BadOpcodes)
        ));
    }

    #[test]
    fn test_scan_lifecycle_misuse() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        assert!(matches!(index.scan_next(), Err(Error::ScanNotInitialized)));
        assert!(matches!(index.end_scan(), Err(Error::ScanNotInitialized)));
    }

    #[test]
    fn test_restart_implicitly_ends_previous_scan() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        index.start_scan(1, Operator::Gte, 20, Operator::Lte).unwrap();
        index.scan_next().unwrap();

        // No end_scan in between; the old cursor's pin must be released
        index.start_scan(9, Operator::Gte, 20, Operator::Lte).unwrap();
        assert_eq!(collect_scan(&mut index), vec![9, 15, 20]);
        index.end_scan().unwrap();

        assert!(bm.dump().iter().all(|s| s.pin_count == 0));
    }

    #[test]
    fn test_scan_crosses_leaf_boundaries() {
        let (bm, dir) = setup();
        let rel = Relation::open(&bm, dir.path().join("emp.rel")).unwrap();
        let mut index = BTreeIndex::new(&bm, &rel, 0, AttrType::Int).unwrap();
        index.set_fanouts(3, 3);

        for key in 0..100 {
            index
                .insert_entry(key, RecordId::new(PageId::new(key as u32), 0))
                .unwrap();
        }

        index.start_scan(10, Operator::Gte, 90, Operator::Lt).unwrap();
        assert_eq!(collect_scan(&mut index), (10..90).collect::<Vec<_>>());
        index.end_scan().unwrap();

        assert!(bm.dump().iter().all(|s| s.pin_count == 0));
    }

    #[test]
    fn test_low_bound_match_in_later_leaf() {
        let (bm, dir) = setup();
        let rel = Relation::open(&bm, dir.path().join("emp.rel")).unwrap();
        let mut index = BTreeIndex::new(&bm, &rel, 0, AttrType::Int).unwrap();
        index.set_fanouts(3, 3);

        // Sparse keys: the leaf covering the low bound holds no match,
        // forcing the positioning walk across siblings
        for key in (0..100).step_by(10) {
            index
                .insert_entry(key, RecordId::new(PageId::new(key as u32), 0))
                .unwrap();
        }

        index.start_scan(41, Operator::Gte, 75, Operator::Lte).unwrap();
        assert_eq!(collect_scan(&mut index), vec![50, 60, 70]);
        index.end_scan().unwrap();
    }

    #[test]
    fn test_scan_returns_stored_record_ids() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        index.start_scan(0, Operator::Gte, 100, Operator::Lte).unwrap();
        let rid = index.scan_next().unwrap();
        assert_eq!(rid, RecordId::new(PageId::new(1), 0));
        index.end_scan().unwrap();
    }

    #[test]
    fn test_end_scan_releases_pin() {
        let (bm, dir) = setup();
        let (_rel, mut index) = open_index(&bm, &dir, &KEYS);

        index.start_scan(1, Operator::Gte, 20, Operator::Lte).unwrap();
        assert!(bm.dump().iter().any(|s| s.pin_count == 1));
        index.end_scan().unwrap();
        assert!(bm.dump().iter().all(|s| s.pin_count == 0));
    }
}

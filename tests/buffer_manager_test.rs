//! Integration tests for the buffer manager.
//!
//! These tests verify cross-component behavior that unit tests don't cover:
//! pin-bounded workloads, eviction churn against real files, statistics,
//! and reload across manager instances.

use chalkdb::buffer::BufferManager;
use chalkdb::common::{Error, FileId, PageId};
use tempfile::tempdir;

fn create_bm(pool_size: usize) -> (BufferManager, FileId, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let bm = BufferManager::new(pool_size);
    let file = bm.create_file(dir.path().join("test.db")).unwrap();
    (bm, file, dir)
}

/// Allocate a page whose first payload bytes identify it, then unpin dirty.
fn make_page(bm: &BufferManager, file: FileId, tag: u32) -> PageId {
    let (pid, mut guard) = bm.allocate_page(file).unwrap();
    guard.as_mut_slice()[64..68].copy_from_slice(&tag.to_le_bytes());
    drop(guard);
    bm.unpin_page(file, pid, true).unwrap();
    pid
}

fn read_tag(bm: &BufferManager, file: FileId, pid: PageId) -> u32 {
    let guard = bm.fetch_page(file, pid).unwrap();
    let tag = u32::from_le_bytes(guard.as_slice()[64..68].try_into().unwrap());
    drop(guard);
    bm.unpin_page(file, pid, false).unwrap();
    tag
}

/// Heavy churn through a tiny pool: every page must survive eviction.
#[test]
fn test_data_persistence_across_evictions() {
    let (bm, file, _dir) = create_bm(3);

    let pids: Vec<PageId> = (0..50).map(|i| make_page(&bm, file, i)).collect();
    assert!(bm.stats().snapshot().evictions > 0);

    for (i, &pid) in pids.iter().enumerate() {
        assert_eq!(read_tag(&bm, file, pid), i as u32);
    }
}

/// Any workload that keeps simultaneous pins within pool capacity must
/// never see the pool exhausted.
#[test]
fn test_pin_bounded_workload_never_exhausts() {
    let (bm, file, _dir) = create_bm(4);
    let pids: Vec<PageId> = (0..20).map(|i| make_page(&bm, file, i)).collect();

    for round in 0..10 {
        // Hold up to 4 pins at a time, in shifting groups
        let group: Vec<PageId> = (0..4).map(|i| pids[(round * 3 + i) % pids.len()]).collect();
        let guards: Vec<_> = group
            .iter()
            .map(|&pid| bm.fetch_page(file, pid).unwrap())
            .collect();
        drop(guards);
        for &pid in &group {
            bm.unpin_page(file, pid, false).unwrap();
        }
    }
}

/// Holding every frame pinned exhausts the pool; releasing one pin heals it.
#[test]
fn test_exhaustion_and_recovery() {
    let (bm, file, _dir) = create_bm(3);

    let pids: Vec<PageId> = (0..3)
        .map(|_| {
            let (pid, guard) = bm.allocate_page(file).unwrap();
            drop(guard);
            pid
        })
        .collect();

    assert!(matches!(
        bm.allocate_page(file),
        Err(Error::BufferExceeded(3))
    ));
    assert!(matches!(
        bm.fetch_page(file, PageId::new(0)),
        Err(Error::BufferExceeded(3))
    ));

    bm.unpin_page(file, pids[0], false).unwrap();
    let (_pid, guard) = bm.allocate_page(file).unwrap();
    drop(guard);

    for &pid in &pids[1..] {
        bm.unpin_page(file, pid, false).unwrap();
    }
}

/// Pages from several files share one pool without cross-talk.
#[test]
fn test_multiple_files_share_pool() {
    let dir = tempdir().unwrap();
    let bm = BufferManager::new(4);
    let file_a = bm.create_file(dir.path().join("a.db")).unwrap();
    let file_b = bm.create_file(dir.path().join("b.db")).unwrap();

    let a_pids: Vec<PageId> = (0..10).map(|i| make_page(&bm, file_a, i)).collect();
    let b_pids: Vec<PageId> = (0..10).map(|i| make_page(&bm, file_b, 1000 + i)).collect();

    // Same page numbers, different files, different contents
    for i in 0..10 {
        assert_eq!(read_tag(&bm, file_a, a_pids[i]), i as u32);
        assert_eq!(read_tag(&bm, file_b, b_pids[i]), 1000 + i as u32);
    }
}

/// Flush then reload through a brand-new manager instance.
#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");

    let pid;
    {
        let bm = BufferManager::new(8);
        let file = bm.create_file(&path).unwrap();
        pid = make_page(&bm, file, 0xBEEF);
        bm.flush_file(file).unwrap();
    }

    let bm = BufferManager::new(8);
    let file = bm.open_file(&path).unwrap();
    assert_eq!(read_tag(&bm, file, pid), 0xBEEF);
}

/// Statistics reflect hits, misses, and write-backs.
#[test]
fn test_statistics_track_workload() {
    let (bm, file, _dir) = create_bm(8);

    let pid = make_page(&bm, file, 1);
    for _ in 0..5 {
        read_tag(&bm, file, pid); // resident: hits
    }

    let stats = bm.stats().snapshot();
    assert_eq!(stats.cache_hits, 5);
    assert_eq!(stats.cache_misses, 0);
    assert!(stats.hit_rate() > 0.99);

    bm.flush_file(file).unwrap();
    read_tag(&bm, file, pid); // gone from the pool: a miss and a read
    let stats = bm.stats().snapshot();
    assert_eq!(stats.cache_misses, 1);
    assert!(stats.pages_written >= 1);
    assert!(stats.pages_read >= 1);
}

/// The frame dump names every resident page exactly once.
#[test]
fn test_dump_matches_residency() {
    let (bm, file, _dir) = create_bm(4);
    let pids: Vec<PageId> = (0..3).map(|i| make_page(&bm, file, i)).collect();

    let dump = bm.dump();
    assert_eq!(dump.len(), 4);
    for pid in &pids {
        assert_eq!(
            dump.iter()
                .filter(|s| s.valid && s.file == Some(file) && s.page_no == *pid)
                .count(),
            1
        );
    }
    assert_eq!(dump.iter().filter(|s| !s.valid).count(), 1);
}

/// Disposed pages disappear from pool and file; their ids get reused.
#[test]
fn test_dispose_then_reallocate() {
    let (bm, file, _dir) = create_bm(4);

    let pid = make_page(&bm, file, 7);
    bm.dispose_page(file, pid).unwrap();
    assert!(matches!(
        bm.fetch_page(file, pid),
        Err(Error::PageNotFound(_))
    ));

    // Allocation reuses the retired slot, zeroed
    let (reused, guard) = bm.allocate_page(file).unwrap();
    assert_eq!(reused, pid);
    assert!(guard.as_slice()[64..68].iter().all(|&b| b == 0));
    drop(guard);
    bm.unpin_page(file, reused, false).unwrap();
}

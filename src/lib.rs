//! chalkdb - the storage core of a teaching database engine.
//!
//! Two components carry the engineering weight: a fixed-size buffer pool
//! with clock (second-chance) eviction, and a B+ tree index over an integer
//! attribute, built entirely on top of the buffer pool's page abstraction.
//!
//! # Architecture
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                         chalkdb                           │
//! ├───────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │               Index Layer (index/)                  │  │
//! │  │     BTreeIndex: insert + ordered range scans        │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                            ↓                              │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │             Buffer Pool (buffer/)                   │  │
//! │  │   BufferManager + Frame + clock eviction + stats    │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! │                            ↓                              │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │             Storage Layer (storage/)                │  │
//! │  │      PageFile + Page + PageHeader + Relation        │  │
//! │  └─────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FileId, RecordId, Error, config)
//! - [`buffer`] - Buffer pool management and clock eviction
//! - [`storage`] - Page files, page formats, heap relations
//! - [`index`] - The B+ tree index
//!
//! # Quick Start
//! ```no_run
//! use chalkdb::buffer::BufferManager;
//! use chalkdb::index::{AttrType, BTreeIndex, Operator};
//! use chalkdb::storage::Relation;
//!
//! let bm = BufferManager::new(128);
//! let mut rel = Relation::create(&bm, "emp.rel").unwrap();
//! rel.insert_record(&42i32.to_le_bytes()).unwrap();
//!
//! // Index the integer at byte offset 0 of every record
//! let mut index = BTreeIndex::new(&bm, &rel, 0, AttrType::Int).unwrap();
//! index.start_scan(0, Operator::Gte, 100, Operator::Lte).unwrap();
//! while let Ok(rid) = index.scan_next() {
//!     println!("matched record {rid}");
//! }
//! index.end_scan().unwrap();
//! ```
//!
//! # Resource model
//! Every successful page fetch or allocation through the [`buffer::BufferManager`]
//! must be paired with exactly one unpin; pins are the only thing keeping a
//! cached page from being evicted. The index follows this discipline
//! internally, including across scan lifetimes.

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FileId, FrameId, PageId, RecordId, Result};

pub use buffer::{BufferManager, BufferPoolStats, StatsSnapshot};
pub use index::{AttrType, BTreeIndex, Operator};
pub use storage::{Page, PageFile, PageHeader, PageType, Relation};

//! Storage layer - page files, page formats, and heap relations.
//!
//! This module handles persistent storage:
//! - [`PageFile`] - a named container of fixed-size pages
//! - [`page`] - page buffer and header layouts
//! - [`Relation`] - a heap file of variable-length records

pub mod page;
mod page_file;
mod relation;

pub use page::{Page, PageHeader, PageType};
pub use page_file::PageFile;
pub use relation::{Relation, RelationScan};

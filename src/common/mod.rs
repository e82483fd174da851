//! Common types and utilities shared across chalkdb.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants
//! - The crate-wide error type
//! - Identifiers (PageId, FrameId, FileId)

pub mod config;
pub mod error;
mod file_id;
mod frame_id;
mod page_id;
mod record_id;

pub use error::{Error, Result};
pub use file_id::FileId;
pub use frame_id::FrameId;
pub use page_id::PageId;
pub use record_id::RecordId;

//! B+ tree index over an integer attribute.
//!
//! File layout: the first page is the meta record ([`node::MetaRecord`]);
//! every other page is a leaf or internal node tagged by the page-type byte.
//! All page access goes through the buffer manager; nodes are decoded into
//! owned values, mutated, and encoded back, so no code ever reinterprets a
//! raw page buffer in place.

mod index;
mod node;
mod scan;

pub use index::BTreeIndex;
pub use node::{INTERNAL_FANOUT, LEAF_FANOUT};
pub use scan::Operator;

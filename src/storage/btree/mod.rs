//! Timestamp-keyed B+ tree over 4096-byte pages.
//!
//! Every client owns one tree per event kind. Keys are event timestamps and
//! leaf values are payload offsets; duplicates are allowed and keep their
//! insertion order. All traversals are loops over explicit stacks or parent
//! links, never recursion.

mod check;
mod insert;
mod scan;
mod store;

pub use check::{check, Bounds, TreeCheck};
pub use insert::{create_root, current_root, insert};
pub use scan::{range, reclaim, Reclaimed};
pub use store::{FileNodeStore, NodeStore};

/// Deepest tree any traversal will follow before declaring the structure corrupt.
pub(crate) const MAX_DEPTH: usize = 32;

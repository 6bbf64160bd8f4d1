//! On-disk structures of the single-file format and the algorithms over them.
//!
//! Everything here works against a borrowed [`FileIo`](crate::primitives::io::FileIo)
//! or [`NodeStore`](btree::NodeStore); locking and durability policy live in
//! [`crate::db`].

/// B+ tree index keyed by event timestamp.
pub mod btree;

/// Open-addressed client directory with its cache.
pub mod directory;

/// Free lists in front of the bump cursor.
pub mod freespace;

/// Record codecs for clients and events.
pub mod record;

mod header;
mod node;

pub use directory::Directory;
pub use freespace::{Allocation, BlockClass, FreeListLengths, FreeSpace};
pub use header::Header;
pub use node::TreeNode;
pub use record::{ClientRecord, Clipboard, EventRecord, Keystroke, WindowEvent};

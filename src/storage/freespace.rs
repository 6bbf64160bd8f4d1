//! Best-effort free lists in front of the header's bump cursor.
//!
//! The lists live only in memory. Space released before a restart is not
//! reused after it; the bump cursor in the header is the only persisted state.

use serde::Serialize;
use tracing::debug;

use crate::storage::Header;
use crate::types::format::NODE_PAGE_LEN;
use crate::types::{EventKind, MeowError, Offset, Result};

/// Size class of an allocation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlockClass {
    /// One 4096-byte tree page.
    Node,
    /// One event payload of the given kind.
    Data(EventKind),
}

impl BlockClass {
    /// Byte length of one block of this class.
    pub const fn len(self) -> u64 {
        match self {
            BlockClass::Node => NODE_PAGE_LEN as u64,
            BlockClass::Data(kind) => kind.record_len() as u64,
        }
    }
}

/// Result of [`FreeSpace::allocate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Allocation {
    /// Start of the block.
    pub offset: Offset,
    /// The header's bump cursor moved and must be persisted.
    pub bumped: bool,
}

/// Free-list lengths for reporting.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FreeListLengths {
    /// Reusable tree pages.
    pub node_pages: usize,
    /// Reusable keystroke payloads.
    pub keystroke_blocks: usize,
    /// Reusable clipboard payloads.
    pub clipboard_blocks: usize,
    /// Reusable window payloads.
    pub window_blocks: usize,
}

/// Per-class stacks of released offsets.
#[derive(Debug, Default)]
pub struct FreeSpace {
    node_pages: Vec<Offset>,
    data_blocks: [Vec<Offset>; 3],
}

impl FreeSpace {
    /// Empty lists.
    pub fn new() -> Self {
        Self::default()
    }

    fn list_mut(&mut self, class: BlockClass) -> &mut Vec<Offset> {
        match class {
            BlockClass::Node => &mut self.node_pages,
            BlockClass::Data(kind) => &mut self.data_blocks[kind.index()],
        }
    }

    /// Pops a released block of `class`, or bumps the header cursor.
    ///
    /// A bump whose end would pass `file_size` fails without touching the header.
    pub fn allocate(&mut self, header: &mut Header, class: BlockClass) -> Result<Allocation> {
        if let Some(offset) = self.list_mut(class).pop() {
            debug!(offset, ?class, "freespace.reuse");
            return Ok(Allocation { offset, bumped: false });
        }
        let len = class.len();
        let offset = header.next_free_offset;
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= header.file_size)
            .ok_or_else(|| MeowError::CapacityExhausted {
                requested: len,
                cursor: offset,
                capacity: header.file_size,
            })?;
        header.next_free_offset = end;
        Ok(Allocation { offset, bumped: true })
    }

    /// Returns a block to its class list.
    pub fn release(&mut self, class: BlockClass, offset: Offset) {
        if offset == 0 {
            return;
        }
        self.list_mut(class).push(offset);
    }

    /// Current list lengths.
    pub fn lengths(&self) -> FreeListLengths {
        FreeListLengths {
            node_pages: self.node_pages.len(),
            keystroke_blocks: self.data_blocks[EventKind::Keystroke.index()].len(),
            clipboard_blocks: self.data_blocks[EventKind::Clipboard.index()].len(),
            window_blocks: self.data_blocks[EventKind::Window.index()].len(),
        }
    }
}

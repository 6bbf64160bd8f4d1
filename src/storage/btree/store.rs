use tracing::warn;

use crate::primitives::io::FileIo;
use crate::storage::freespace::{BlockClass, FreeSpace};
use crate::storage::node::TreeNode;
use crate::storage::Header;
use crate::types::format::NODE_PAGE_LEN;
use crate::types::{MeowError, Offset, Result};

/// Page access used by the tree algorithms.
pub trait NodeStore {
    /// Reads and decodes one page. Pages with too many keys report `Corruption`.
    fn read_node(&mut self, offset: Offset) -> Result<TreeNode>;
    /// Encodes and writes one page.
    fn write_node(&mut self, offset: Offset, node: &TreeNode) -> Result<()>;
    /// Reserves a fresh page; its content is undefined until written.
    fn allocate_node(&mut self) -> Result<Offset>;
    /// Hands a page back for reuse.
    fn release_node(&mut self, offset: Offset);

    /// Reads a page, resetting it to an empty leaf when its key count is out of range.
    fn read_or_repair(&mut self, offset: Offset) -> Result<TreeNode> {
        match self.read_node(offset) {
            Ok(node) => Ok(node),
            Err(MeowError::Corruption(reason)) => {
                warn!(offset, %reason, "btree.node_reset");
                let node = TreeNode::empty_leaf();
                self.write_node(offset, &node)?;
                Ok(node)
            }
            Err(err) => Err(err),
        }
    }
}

/// [`NodeStore`] over the database file, allocating through the free lists.
///
/// A bump allocation rewrites the header immediately so the on-disk cursor
/// never trails a page that is already referenced.
pub struct FileNodeStore<'a> {
    io: &'a dyn FileIo,
    header: &'a mut Header,
    free: &'a mut FreeSpace,
}

impl<'a> FileNodeStore<'a> {
    /// Wraps the engine state borrowed for one operation.
    pub fn new(io: &'a dyn FileIo, header: &'a mut Header, free: &'a mut FreeSpace) -> Self {
        Self { io, header, free }
    }

    fn check_bounds(&self, offset: Offset) -> Result<()> {
        let end = offset.saturating_add(NODE_PAGE_LEN as u64);
        if offset == 0 || end > self.header.file_size {
            return Err(MeowError::Corruption(format!(
                "node offset {offset} outside file of {} bytes",
                self.header.file_size
            )));
        }
        Ok(())
    }
}

impl NodeStore for FileNodeStore<'_> {
    fn read_node(&mut self, offset: Offset) -> Result<TreeNode> {
        self.check_bounds(offset)?;
        let mut buf = vec![0u8; NODE_PAGE_LEN];
        self.io.read_at(offset, &mut buf)?;
        TreeNode::decode(&buf)
    }

    fn write_node(&mut self, offset: Offset, node: &TreeNode) -> Result<()> {
        self.check_bounds(offset)?;
        self.io.write_at(offset, &node.encode()?)
    }

    fn allocate_node(&mut self) -> Result<Offset> {
        let alloc = self.free.allocate(self.header, BlockClass::Node)?;
        if alloc.bumped {
            self.io.write_at(0, &self.header.encode())?;
        }
        Ok(alloc.offset)
    }

    fn release_node(&mut self, offset: Offset) {
        self.free.release(BlockClass::Node, offset);
    }
}

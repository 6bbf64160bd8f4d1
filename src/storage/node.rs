use std::ops::Range;

use crate::primitives::bytes::ne;
use crate::types::format::{NODE_PAGE_LEN, ORDER};
use crate::types::{MeowError, Offset, Result};

const ND_IS_LEAF: usize = 0;
const ND_NUM_KEYS: Range<usize> = 4..8;
const ND_KEYS: usize = 8;
const ND_CHILDREN: usize = ND_KEYS + ORDER * 8;
const ND_NEXT_LEAF: Range<usize> = 1024..1032;
const ND_PARENT: Range<usize> = 1032..1040;

const _: () = {
    assert!(ND_CHILDREN == 512);
    assert!(ND_CHILDREN + (ORDER + 1) * 8 == ND_NEXT_LEAF.start);
    assert!(ND_PARENT.end <= NODE_PAGE_LEN);
};

/// Decoded B+ tree page.
///
/// In a leaf, `children[i]` is the payload offset for `keys[i]` and the two
/// vectors have equal length. In an internal node `children` holds one more
/// entry than `keys`. Zero stands for "no node" in `next_leaf` and `parent`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeNode {
    /// Leaf or internal.
    pub is_leaf: bool,
    /// Sorted (non-decreasing) timestamps.
    pub keys: Vec<u64>,
    /// Payload offsets (leaf) or child page offsets (internal).
    pub children: Vec<Offset>,
    /// Next leaf in key order.
    pub next_leaf: Offset,
    /// Parent page, zero at the root.
    pub parent: Offset,
}

impl TreeNode {
    /// An empty leaf with no siblings or parent.
    pub fn empty_leaf() -> Self {
        Self {
            is_leaf: true,
            keys: Vec::with_capacity(ORDER),
            children: Vec::with_capacity(ORDER + 1),
            next_leaf: 0,
            parent: 0,
        }
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the node holds no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether one more key would overflow the page.
    pub fn is_full(&self) -> bool {
        self.keys.len() >= ORDER
    }

    /// Serializes into a full page image.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let want_children = if self.is_leaf { self.keys.len() } else { self.keys.len() + 1 };
        if self.keys.len() > ORDER || self.children.len() != want_children {
            return Err(MeowError::Corruption(format!(
                "node with {} keys and {} children cannot be encoded",
                self.keys.len(),
                self.children.len()
            )));
        }
        let mut buf = vec![0u8; NODE_PAGE_LEN];
        buf[ND_IS_LEAF] = self.is_leaf as u8;
        ne::put_u32(&mut buf[ND_NUM_KEYS], self.keys.len() as u32);
        for (i, key) in self.keys.iter().enumerate() {
            ne::put_u64(&mut buf[ND_KEYS + i * 8..], *key);
        }
        for (i, child) in self.children.iter().enumerate() {
            ne::put_u64(&mut buf[ND_CHILDREN + i * 8..], *child);
        }
        ne::put_u64(&mut buf[ND_NEXT_LEAF], self.next_leaf);
        ne::put_u64(&mut buf[ND_PARENT], self.parent);
        Ok(buf)
    }

    /// Parses a page image. A key count above `ORDER` is reported as corruption.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_PAGE_LEN {
            return Err(MeowError::Corruption(format!(
                "node page truncated: {} of {NODE_PAGE_LEN} bytes",
                buf.len()
            )));
        }
        let num_keys = ne::get_u32(&buf[ND_NUM_KEYS]) as usize;
        if num_keys > ORDER {
            return Err(MeowError::Corruption(format!(
                "node holds {num_keys} keys, order is {ORDER}"
            )));
        }
        let is_leaf = buf[ND_IS_LEAF] != 0;
        let num_children = if is_leaf { num_keys } else { num_keys + 1 };
        let keys = (0..num_keys).map(|i| ne::get_u64(&buf[ND_KEYS + i * 8..])).collect();
        let children = (0..num_children)
            .map(|i| ne::get_u64(&buf[ND_CHILDREN + i * 8..]))
            .collect();
        Ok(Self {
            is_leaf,
            keys,
            children,
            next_leaf: ne::get_u64(&buf[ND_NEXT_LEAF]),
            parent: ne::get_u64(&buf[ND_PARENT]),
        })
    }
}

use rustc_hash::FxHashSet;
use tracing::warn;

use super::store::NodeStore;
use super::MAX_DEPTH;
use crate::types::{MeowError, Offset, Result};

/// Entries with `start <= key <= end`, in key order (ties in insertion order).
///
/// Descends to the leftmost leaf that can hold `start`, then walks the leaf
/// chain until a key passes `end`.
pub fn range<S: NodeStore>(
    store: &mut S,
    root: Offset,
    start: u64,
    end: u64,
) -> Result<Vec<(u64, Offset)>> {
    let mut out = Vec::new();
    if start > end || root == 0 {
        return Ok(out);
    }
    let mut offset = root;
    let mut node = store.read_or_repair(offset)?;
    let mut depth = 0;
    while !node.is_leaf {
        depth += 1;
        if depth > MAX_DEPTH {
            return Err(MeowError::Corruption(format!(
                "tree below {root} deeper than {MAX_DEPTH} levels"
            )));
        }
        let idx = node.keys.partition_point(|k| *k < start);
        offset = node.children[idx];
        node = store.read_or_repair(offset)?;
    }

    let mut seen = FxHashSet::default();
    loop {
        if !seen.insert(offset) {
            warn!(leaf = offset, root, "btree.leaf_cycle");
            break;
        }
        for (key, value) in node.keys.iter().zip(&node.children) {
            if *key > end {
                return Ok(out);
            }
            if *key >= start {
                out.push((*key, *value));
            }
        }
        if node.next_leaf == 0 {
            break;
        }
        offset = node.next_leaf;
        node = store.read_or_repair(offset)?;
        if !node.is_leaf {
            warn!(node = offset, root, "btree.leaf_chain_into_internal");
            break;
        }
    }
    Ok(out)
}

/// What [`reclaim`] gave back.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reclaimed {
    /// Pages released to the store.
    pub nodes: usize,
    /// Payload offsets referenced by the released leaves.
    pub values: Vec<Offset>,
}

/// Releases every page of the tree at `root` and collects its payload offsets.
///
/// Only internal-node child links are followed, so each leaf is visited once
/// through its parent. Pages that fail to decode are skipped and stay allocated.
pub fn reclaim<S: NodeStore>(store: &mut S, root: Offset) -> Result<Reclaimed> {
    let mut out = Reclaimed::default();
    if root == 0 {
        return Ok(out);
    }
    let mut stack = vec![root];
    let mut seen = FxHashSet::default();
    while let Some(offset) = stack.pop() {
        if offset == 0 || !seen.insert(offset) {
            continue;
        }
        match store.read_node(offset) {
            Ok(node) if node.is_leaf => out.values.extend_from_slice(&node.children),
            Ok(node) => stack.extend_from_slice(&node.children),
            Err(MeowError::Corruption(reason)) => {
                warn!(offset, %reason, "btree.reclaim_skip");
                continue;
            }
            Err(err) => return Err(err),
        }
        store.release_node(offset);
        out.nodes += 1;
    }
    Ok(out)
}

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::store::NodeStore;
use super::MAX_DEPTH;
use crate::storage::node::TreeNode;
use crate::types::format::ORDER;
use crate::types::{MeowError, Offset, Result};

type Path = SmallVec<[(Offset, TreeNode); 4]>;

/// Writes an empty leaf at a freshly allocated page and returns its offset.
pub fn create_root<S: NodeStore>(store: &mut S) -> Result<Offset> {
    let offset = store.allocate_node()?;
    store.write_node(offset, &TreeNode::empty_leaf())?;
    Ok(offset)
}

/// Inserts `(key, value)` below `root` and returns the root afterwards.
///
/// Equal keys land after the ones already present, so ties keep arrival order.
/// Every page a split will need is reserved before the first write; when the
/// reservation fails nothing on disk has changed.
pub fn insert<S: NodeStore>(store: &mut S, root: Offset, key: u64, value: Offset) -> Result<Offset> {
    let mut path = Path::new();
    let mut offset = root;
    let mut node = store.read_or_repair(offset)?;
    while !node.is_leaf {
        if path.len() >= MAX_DEPTH {
            return Err(MeowError::Corruption(format!(
                "tree below {root} deeper than {MAX_DEPTH} levels"
            )));
        }
        let idx = node.keys.partition_point(|k| *k <= key);
        let child = node.children[idx];
        path.push((offset, node));
        offset = child;
        node = store.read_or_repair(offset)?;
    }

    let pos = node.keys.partition_point(|k| *k <= key);
    if !node.is_full() {
        node.keys.insert(pos, key);
        node.children.insert(pos, value);
        store.write_node(offset, &node)?;
        trace!(leaf = offset, key, "btree.insert");
        return Ok(root);
    }

    let mut fresh = reserve_pages(store, &path)?;
    let mut take = || {
        fresh
            .pop()
            .ok_or_else(|| MeowError::Corruption("split reservation exhausted".into()))
    };
    let grows = path.iter().all(|(_, ancestor)| ancestor.is_full());
    let new_root = if grows { take()? } else { 0 };
    let mut plan = SplitPlan::default();

    node.keys.insert(pos, key);
    node.children.insert(pos, value);
    let split = (node.keys.len() + 1) / 2;
    let parent = path.last().map_or(new_root, |(off, _)| *off);
    let mut right_offset = take()?;
    let right = TreeNode {
        is_leaf: true,
        keys: node.keys.split_off(split),
        children: node.children.split_off(split),
        next_leaf: node.next_leaf,
        parent,
    };
    node.next_leaf = right_offset;
    node.parent = parent;
    let mut separator = right.keys[0];
    debug!(leaf = offset, right = right_offset, separator, "btree.split_leaf");
    plan.created.push((right_offset, right));
    plan.changed.push((offset, node));

    let mut left_offset = offset;
    loop {
        let Some((parent_offset, mut parent)) = path.pop() else {
            if new_root == 0 {
                return Err(MeowError::Corruption(format!(
                    "split below {root} reached the top without a reserved root"
                )));
            }
            let root_node = TreeNode {
                is_leaf: false,
                keys: vec![separator],
                children: vec![left_offset, right_offset],
                next_leaf: 0,
                parent: 0,
            };
            plan.created.push((new_root, root_node));
            debug!(root = new_root, "btree.grow");
            break;
        };

        let idx = parent
            .children
            .iter()
            .position(|c| *c == left_offset)
            .ok_or_else(|| {
                MeowError::Corruption(format!(
                    "node {parent_offset} lost track of child {left_offset}"
                ))
            })?;
        parent.keys.insert(idx, separator);
        parent.children.insert(idx + 1, right_offset);
        if parent.keys.len() <= ORDER {
            plan.changed.push((parent_offset, parent));
            break;
        }

        let mid = parent.keys.len() / 2;
        let sibling_offset = take()?;
        let sibling_keys = parent.keys.split_off(mid + 1);
        let promoted = parent.keys.pop().ok_or_else(|| {
            MeowError::Corruption(format!("internal node {parent_offset} split with no keys"))
        })?;
        let above = path.last().map_or(new_root, |(off, _)| *off);
        parent.parent = above;
        let sibling = TreeNode {
            is_leaf: false,
            keys: sibling_keys,
            children: parent.children.split_off(mid + 1),
            next_leaf: 0,
            parent: above,
        };
        for child in &sibling.children {
            plan.reparent(store, *child, sibling_offset)?;
        }
        debug!(node = parent_offset, right = sibling_offset, promoted, "btree.split_internal");
        plan.created.push((sibling_offset, sibling));
        plan.changed.push((parent_offset, parent));

        left_offset = parent_offset;
        separator = promoted;
        right_offset = sibling_offset;
    }

    plan.apply(store)?;
    Ok(if grows { new_root } else { root })
}

type Writes = SmallVec<[(Offset, TreeNode); 4]>;

/// Page images produced by one split, written only once the split is fully planned.
///
/// Fresh pages go out before any page the tree already links to. While only
/// fresh pages are on disk the tree is unchanged, and when the split is a
/// single root leaf its old page is the last write.
#[derive(Default)]
struct SplitPlan {
    created: Writes,
    changed: Writes,
}

impl SplitPlan {
    /// Points `child` at `parent`, editing a planned image when there is one.
    fn reparent<S: NodeStore>(&mut self, store: &mut S, child: Offset, parent: Offset) -> Result<()> {
        let planned = self
            .created
            .iter_mut()
            .chain(self.changed.iter_mut())
            .find(|(offset, _)| *offset == child);
        if let Some((_, node)) = planned {
            node.parent = parent;
            return Ok(());
        }
        let mut node = store.read_node(child)?;
        node.parent = parent;
        self.changed.push((child, node));
        Ok(())
    }

    fn apply<S: NodeStore>(self, store: &mut S) -> Result<()> {
        for (offset, node) in self.created.iter().chain(self.changed.iter()) {
            store.write_node(*offset, node)?;
        }
        Ok(())
    }
}

/// Pages needed to split the leaf and every full ancestor, plus a new root
/// when the split reaches the top.
fn reserve_pages<S: NodeStore>(store: &mut S, path: &Path) -> Result<SmallVec<[Offset; 4]>> {
    let mut needed = 1;
    let mut reaches_root = true;
    for (_, ancestor) in path.iter().rev() {
        if !ancestor.is_full() {
            reaches_root = false;
            break;
        }
        needed += 1;
    }
    if reaches_root {
        needed += 1;
    }
    let mut pages = SmallVec::new();
    for _ in 0..needed {
        match store.allocate_node() {
            Ok(offset) => pages.push(offset),
            Err(err) => {
                for offset in pages {
                    store.release_node(offset);
                }
                return Err(err);
            }
        }
    }
    Ok(pages)
}

/// Follows parent links up from `start` to the node that has none.
///
/// A client record may name a page that has since become a child, so callers
/// resolve through here before descending. An unreadable page ends the walk
/// at the last page that was reached; `start == 0` means no tree.
pub fn current_root<S: NodeStore>(store: &mut S, start: Offset) -> Result<Offset> {
    if start == 0 {
        return Ok(0);
    }
    let mut offset = start;
    for _ in 0..MAX_DEPTH {
        let parent = match store.read_node(offset) {
            Ok(node) => node.parent,
            Err(MeowError::Corruption(reason)) => {
                warn!(node = offset, start, %reason, "btree.parent_chain_broken");
                return Ok(offset);
            }
            Err(err) => return Err(err),
        };
        if parent == 0 {
            return Ok(offset);
        }
        offset = parent;
    }
    Err(MeowError::Corruption(format!(
        "parent chain from {start} longer than {MAX_DEPTH}"
    )))
}

use rustc_hash::FxHashSet;
use serde::Serialize;

use super::store::NodeStore;
use super::MAX_DEPTH;
use crate::types::format::NODE_PAGE_LEN;
use crate::types::{MeowError, Offset, Result};

/// Region that pages and payloads of a tree must lie in.
#[derive(Copy, Clone, Debug)]
pub struct Bounds {
    /// First byte available to allocations.
    pub floor: Offset,
    /// Bump cursor; nothing allocated lies past it.
    pub ceiling: Offset,
    /// Payload size of the tree's event kind.
    pub value_len: u64,
}

impl Bounds {
    fn contains(&self, offset: Offset, len: u64) -> bool {
        offset >= self.floor && offset.saturating_add(len) <= self.ceiling
    }
}

/// Findings for one tree.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TreeCheck {
    /// Levels from root to leaves.
    pub depth: usize,
    /// Pages reached from the root.
    pub nodes: usize,
    /// Leaves reached from the root.
    pub leaves: usize,
    /// Entries across all leaves.
    pub entries: u64,
    /// Leaves reached by following the leaf chain.
    pub chained_leaves: usize,
    /// Human-readable invariant violations.
    pub problems: Vec<String>,
}

impl TreeCheck {
    /// No violations found.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }
}

struct Visit {
    offset: Offset,
    parent: Offset,
    lo: u64,
    hi: u64,
    depth: usize,
}

/// Walks the tree at `root` without modifying it.
pub fn check<S: NodeStore>(store: &mut S, root: Offset, bounds: Bounds) -> Result<TreeCheck> {
    let mut report = TreeCheck::default();
    if root == 0 {
        return Ok(report);
    }
    let mut leaf_depth = None;
    let mut seen = FxHashSet::default();
    let mut stack = vec![Visit { offset: root, parent: 0, lo: 0, hi: u64::MAX, depth: 1 }];
    while let Some(visit) = stack.pop() {
        let Visit { offset, parent, lo, hi, depth } = visit;
        if !seen.insert(offset) {
            report.problems.push(format!("page {offset} reachable twice"));
            continue;
        }
        if !bounds.contains(offset, NODE_PAGE_LEN as u64) {
            report.problems.push(format!("page {offset} outside allocated region"));
            continue;
        }
        if depth > MAX_DEPTH {
            report.problems.push(format!("page {offset} deeper than {MAX_DEPTH} levels"));
            continue;
        }
        let node = match store.read_node(offset) {
            Ok(node) => node,
            Err(MeowError::Corruption(reason)) => {
                report.problems.push(format!("page {offset}: {reason}"));
                continue;
            }
            Err(err) => return Err(err),
        };
        report.nodes += 1;
        if node.parent != parent {
            report
                .problems
                .push(format!("page {offset} links parent {} instead of {parent}", node.parent));
        }
        if node.keys.windows(2).any(|w| w[0] > w[1]) {
            report.problems.push(format!("page {offset} keys out of order"));
        }
        if node.keys.first().is_some_and(|k| *k < lo) || node.keys.last().is_some_and(|k| *k > hi) {
            report.problems.push(format!("page {offset} keys escape separator range [{lo}, {hi}]"));
        }

        if node.is_leaf {
            report.leaves += 1;
            report.entries += node.keys.len() as u64;
            match leaf_depth {
                None => leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    report.problems.push(format!("leaf {offset} at depth {depth}, expected {d}"));
                }
                Some(_) => {}
            }
            for value in &node.children {
                if !bounds.contains(*value, bounds.value_len) {
                    report.problems.push(format!("leaf {offset} points at payload {value} out of range"));
                }
            }
            continue;
        }

        if node.keys.is_empty() {
            report.problems.push(format!("internal page {offset} has no separators"));
        }
        for (i, child) in node.children.iter().enumerate().rev() {
            let child_lo = if i == 0 { lo } else { node.keys[i - 1] };
            let child_hi = node.keys.get(i).copied().unwrap_or(hi);
            stack.push(Visit { offset: *child, parent: offset, lo: child_lo, hi: child_hi, depth: depth + 1 });
        }
    }
    report.depth = leaf_depth.unwrap_or(0);
    walk_chain(store, root, &mut report)?;
    if report.chained_leaves != report.leaves {
        report.problems.push(format!(
            "leaf chain links {} leaves, tree holds {}",
            report.chained_leaves, report.leaves
        ));
    }
    Ok(report)
}

fn walk_chain<S: NodeStore>(store: &mut S, root: Offset, report: &mut TreeCheck) -> Result<()> {
    let mut offset = root;
    let mut node = match store.read_node(offset) {
        Ok(node) => node,
        Err(MeowError::Corruption(_)) => return Ok(()),
        Err(err) => return Err(err),
    };
    for _ in 0..MAX_DEPTH {
        if node.is_leaf {
            break;
        }
        offset = node.children[0];
        node = match store.read_node(offset) {
            Ok(node) => node,
            Err(MeowError::Corruption(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
    }
    let mut seen = FxHashSet::default();
    let mut last_key: Option<u64> = None;
    loop {
        if !seen.insert(offset) {
            report.problems.push(format!("leaf chain loops back to {offset}"));
            return Ok(());
        }
        report.chained_leaves += 1;
        if let (Some(prev), Some(first)) = (last_key, node.keys.first()) {
            if prev > *first {
                report.problems.push(format!("leaf {offset} starts below its predecessor"));
            }
        }
        if let Some(last) = node.keys.last() {
            last_key = Some(*last);
        }
        if node.next_leaf == 0 {
            return Ok(());
        }
        offset = node.next_leaf;
        node = match store.read_node(offset) {
            Ok(node) if node.is_leaf => node,
            Ok(_) => {
                report.problems.push(format!("leaf chain enters internal page {offset}"));
                return Ok(());
            }
            Err(MeowError::Corruption(reason)) => {
                report.problems.push(format!("leaf chain page {offset}: {reason}"));
                return Ok(());
            }
            Err(err) => return Err(err),
        };
    }
}

use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::Database;
use crate::storage::btree::{self, Bounds, FileNodeStore, TreeCheck};
use crate::types::format::NODE_PAGE_LEN;
use crate::types::{client_hash, EventKind, Result};

/// Outcome of a full structural walk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    /// Live directory entries examined.
    pub clients_checked: usize,
    /// Trees walked, one per client and kind with a root.
    pub trees: Vec<TreeFinding>,
    /// Violations outside any single tree.
    pub problems: Vec<String>,
}

/// Result of checking one client's tree of one kind.
#[derive(Debug, Clone, Serialize)]
pub struct TreeFinding {
    /// Owning client.
    pub client_id: String,
    /// Event kind of the tree.
    pub kind: EventKind,
    /// Root page.
    pub root: u64,
    /// Tree walk details.
    pub check: TreeCheck,
}

impl VerifyReport {
    /// No violation anywhere.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.trees.iter().all(|t| t.check.is_clean())
    }

    /// Every violation, prefixed with the tree it came from.
    pub fn all_problems(&self) -> Vec<String> {
        let mut out = self.problems.clone();
        for tree in &self.trees {
            for problem in &tree.check.problems {
                out.push(format!("{}/{}: {problem}", tree.client_id, tree.kind));
            }
        }
        out
    }
}

/// Checks header, directory placement, and every tree. Nothing is written
/// beyond client records whose earlier write failed.
///
/// Trees are walked from the root reached through parent links, so a record
/// that missed a root split still has its full tree checked.
pub fn verify(db: &Database) -> Result<VerifyReport> {
    let report = db.with_state(|state, io| {
        let mut report = VerifyReport::default();
        if let Err(err) = state.header.validate() {
            report.problems.push(format!("header: {err}"));
        }

        let live = state.directory.scan(io)?;
        report.clients_checked = live.len();
        if live.len() != state.header.num_clients as usize {
            report.problems.push(format!(
                "header counts {} clients, directory holds {}",
                state.header.num_clients,
                live.len()
            ));
        }
        let occupied: FxHashSet<usize> = live.iter().map(|(slot, _)| *slot).collect();
        let slots = state.directory.slots();
        for (slot, record) in &live {
            if record.client_hash != client_hash(&record.client_id) {
                report
                    .problems
                    .push(format!("slot {slot}: stored hash does not match {}", record.client_id));
            }
            let mut probe = state.directory.home(record.client_hash);
            while probe != *slot {
                if !occupied.contains(&probe) {
                    report.problems.push(format!(
                        "slot {slot}: {} unreachable, gap at slot {probe}",
                        record.client_id
                    ));
                    break;
                }
                probe = (probe + 1) % slots;
            }
        }

        let floor = state.header.window_tree_offset + NODE_PAGE_LEN as u64;
        let ceiling = state.header.next_free_offset;
        for (_, record) in &live {
            for kind in EventKind::ALL {
                let stored = record.root(kind);
                let mut store = FileNodeStore::new(io, &mut state.header, &mut state.free);
                let root = btree::current_root(&mut store, stored)?;
                if root == 0 {
                    if record.total(kind) != 0 {
                        report.problems.push(format!(
                            "{}/{kind}: {} events counted but no tree",
                            record.client_id,
                            record.total(kind)
                        ));
                    }
                    continue;
                }
                let bounds = Bounds { floor, ceiling, value_len: kind.record_len() as u64 };
                let mut check = btree::check(&mut store, root, bounds)?;
                if root != stored {
                    check
                        .problems
                        .push(format!("client record names page {stored}, tree grows from {root}"));
                }
                if check.entries != record.total(kind) {
                    check.problems.push(format!(
                        "tree holds {} entries, client counter says {}",
                        check.entries,
                        record.total(kind)
                    ));
                }
                report.trees.push(TreeFinding {
                    client_id: record.client_id.clone(),
                    kind,
                    root,
                    check,
                });
            }
        }
        Ok(report)
    })?;
    if report.is_clean() {
        info!(clients = report.clients_checked, trees = report.trees.len(), "verify.clean");
    } else {
        warn!(problems = report.all_problems().len(), "verify.problems_found");
    }
    Ok(report)
}

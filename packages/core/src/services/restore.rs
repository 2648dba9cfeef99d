//! Restore planning
//!
//! Restoring a version reconciles the live subtree of a page against the
//! subtree recorded in the version's `sub_pages_data`. This module computes
//! that reconciliation without touching storage; `PageService::restore`
//! applies it inside one transaction.

use crate::models::SubPageSnapshot;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// What a restore will change under `root`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestorePlan {
    /// Recorded descendants missing from the live subtree, in snapshot order
    pub to_restore: Vec<Uuid>,

    /// Live descendants the version does not know about, in walk order
    pub to_prune: Vec<Uuid>,

    /// Target parent for every page in `to_restore` and `reparented`
    pub parents: HashMap<Uuid, Uuid>,

    /// Surviving descendants whose current parent is being pruned
    pub reparented: Vec<Uuid>,
}

impl RestorePlan {
    pub fn is_noop(&self) -> bool {
        self.to_restore.is_empty() && self.to_prune.is_empty() && self.reparented.is_empty()
    }
}

/// Diff the live subtree of `root` against a recorded one
///
/// Only live entries of `recorded` count. A recorded parent is kept when it
/// is `root` or itself part of the recorded tree; otherwise the page goes
/// directly under `root`. Parent assignments that would loop are also
/// redirected to `root`.
pub fn plan_restore(
    root: Uuid,
    live: &[SubPageSnapshot],
    recorded: &[SubPageSnapshot],
) -> RestorePlan {
    let live_ids: HashSet<Uuid> = live.iter().map(|entry| entry.id).collect();

    let mut seen = HashSet::new();
    let recorded: Vec<&SubPageSnapshot> = recorded
        .iter()
        .filter(|entry| entry.is_live() && entry.id != root && seen.insert(entry.id))
        .collect();
    let recorded_ids: HashSet<Uuid> = recorded.iter().map(|entry| entry.id).collect();

    let mut targets: HashMap<Uuid, Uuid> = recorded
        .iter()
        .map(|entry| {
            let parent = entry
                .parent_id
                .filter(|parent| *parent == root || recorded_ids.contains(parent))
                .unwrap_or(root);
            (entry.id, parent)
        })
        .collect();
    break_cycles(root, &recorded, &mut targets);

    let to_restore: Vec<Uuid> = recorded
        .iter()
        .map(|entry| entry.id)
        .filter(|id| !live_ids.contains(id))
        .collect();

    let to_prune: Vec<Uuid> = live
        .iter()
        .map(|entry| entry.id)
        .filter(|id| !recorded_ids.contains(id))
        .collect();
    let pruned: HashSet<Uuid> = to_prune.iter().copied().collect();

    let reparented: Vec<Uuid> = live
        .iter()
        .filter(|entry| recorded_ids.contains(&entry.id))
        .filter(|entry| entry.parent_id.is_some_and(|parent| pruned.contains(&parent)))
        .map(|entry| entry.id)
        .collect();

    let parents = to_restore
        .iter()
        .chain(reparented.iter())
        .filter_map(|id| targets.get(id).map(|parent| (*id, *parent)))
        .collect();

    RestorePlan {
        to_restore,
        to_prune,
        parents,
        reparented,
    }
}

fn break_cycles(root: Uuid, recorded: &[&SubPageSnapshot], targets: &mut HashMap<Uuid, Uuid>) {
    for entry in recorded {
        let mut visited = HashSet::from([entry.id]);
        let mut current = entry.id;
        while let Some(parent) = targets.get(&current).copied() {
            if parent == root {
                break;
            }
            if !visited.insert(parent) {
                tracing::warn!(
                    "Recorded parent links of {} loop; attaching it to {}",
                    entry.id,
                    root
                );
                targets.insert(entry.id, root);
                break;
            }
            current = parent;
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Path walking: compute a root-first ancestor chain for a node and drive
//! a sequential expand-and-wait down the materialized tree to reveal it.

use std::collections::HashSet;
use std::sync::Arc;

use crate::alert::Alert;
use crate::controller::ControllerInner;
use crate::graph::GraphNodeId;
use crate::navigator::Navigator;

/// Root-first ancestor chain ending at `target`.
///
/// The upward walk takes the *first* parent id at every step. With
/// polyhierarchical data this may pick a different chain than the caller
/// intended; the tie-break is a known ambiguity kept as-is, not a policy
/// to be improved here.
pub fn ancestor_chain(navigator: &Navigator, target: GraphNodeId) -> Vec<GraphNodeId> {
    let mut chain = vec![target];
    let mut seen: HashSet<GraphNodeId> = chain.iter().copied().collect();
    let mut current = target;
    loop {
        let parents = navigator.parent_ids(current);
        let Some(&parent) = parents.first() else {
            break;
        };
        if !seen.insert(parent) {
            log::warn!("walker: parent cycle at {parent}, truncating chain");
            break;
        }
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    chain
}

/// Walk a root-first node-id path: match the chain root against the
/// current root vertices, then expand-and-wait level by level, and select
/// the final vertex. On any unmatched link, emit one structured alert and
/// leave the tree exactly as it was.
pub(crate) async fn walk(inner: &Arc<ControllerInner>, path: &[GraphNodeId]) -> bool {
    let Some((&root_id, rest)) = path.split_first() else {
        log::debug!("walker: empty path, nothing to reveal");
        return false;
    };
    let target = rest.last().copied().unwrap_or(root_id);

    // Root children are fetched at startup; this only waits when a refresh
    // is racing us.
    let root = inner.ui.read(|tree| tree.root());
    if !inner.expand_and_wait(root).await {
        broken(inner, target, root_id);
        return false;
    }

    let matched_root = inner
        .ui
        .dispatch_wait(move |tree| tree.find_child_by_node_id(tree.root(), root_id))
        .await
        .flatten();
    let Some(mut current) = matched_root else {
        broken(inner, target, root_id);
        return false;
    };

    for &next in rest {
        if !inner.expand_and_wait(current).await {
            broken(inner, target, next);
            return false;
        }
        let level = current;
        inner.ui.dispatch(move |tree| tree.set_expanded(level, true));
        let found = inner
            .ui
            .dispatch_wait(move |tree| tree.find_child_by_node_id(level, next))
            .await
            .flatten();
        match found {
            Some(key) => current = key,
            None => {
                broken(inner, target, next);
                return false;
            }
        }
    }

    let revealed = current;
    inner
        .ui
        .dispatch_wait(move |tree| {
            tree.set_selected(Some(revealed));
            tree.set_scroll_target(Some(revealed));
        })
        .await;
    log::debug!("walker: revealed {target}");
    true
}

fn broken(inner: &Arc<ControllerInner>, target: GraphNodeId, missing: GraphNodeId) {
    log::debug!("walker: path to {target} broken at {missing}");
    let _ = inner.alerts.send(Alert::ExpansionPathBroken { target, missing });
}

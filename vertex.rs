/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The materialized tree: an arena of [`GraphVertex`] records rooted at an
//! invisible sentinel.
//!
//! Polyhierarchy invariant: a graph node reachable through N distinct
//! parent paths is materialized as N independent vertices, one per path,
//! never shared by reference. The widget model stays a strict tree at the
//! cost of duplicated subtrees for heavily shared nodes.
//!
//! Boundary: structural mutation is `pub(crate)` and runs only inside
//! dispatcher closures; background tasks read through the dispatcher's
//! shared handle and publish writes back through it.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::display::{CandidateVertex, DisplayPolicy, VertexGraphic};
use crate::graph::{Edge, GraphNodeId};
use crate::navigator::Navigator;

/// Arena key of one materialized vertex. Keys are never reused within a
/// tree, so a stale key simply stops resolving after its subtree is
/// discarded.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VertexKey(u64);

/// Memoized leaf answer for a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeafStatus {
    #[default]
    Unknown,
    Leaf,
    NotLeaf,
}

/// One materialized occurrence of a graph node within the displayed tree.
#[derive(Debug, Clone)]
pub struct GraphVertex {
    key: VertexKey,
    parent: Option<VertexKey>,
    node_id: GraphNodeId,
    /// How this vertex is linked from its tree-parent.
    incoming_type_ids: BTreeSet<GraphNodeId>,
    /// Direct child of the sentinel root. Set at insertion, never inferred
    /// from edge typing: a source may legitimately serve untyped edges
    /// deeper in the graph.
    top_level: bool,
    pub(crate) children: Vec<VertexKey>,
    is_multi_parent: bool,
    /// Count of multi-parent ancestors strictly above this vertex when the
    /// vertex is itself multi-parent; 0 otherwise. Depth > 0 occurrences
    /// are never expanded further, bounding duplication blow-up.
    multi_parent_depth: u32,
    /// Multi-parent vertices on the root path including this one; the seed
    /// for children's `multi_parent_depth`.
    pub(crate) mp_lineage: u32,
    pub(crate) leaf_status: LeafStatus,
    pub(crate) expanded: bool,
    pub(crate) display_text: String,
    pub(crate) graphic: VertexGraphic,
    has_defining_axioms: bool,
    pub(crate) cached_child_edges: Option<Vec<Edge>>,
    /// Bumped by every clear; a fetch may only publish results for the
    /// generation it was scheduled against.
    pub(crate) fetch_generation: u64,
}

impl GraphVertex {
    pub fn key(&self) -> VertexKey {
        self.key
    }

    pub fn parent(&self) -> Option<VertexKey> {
        self.parent
    }

    pub fn node_id(&self) -> GraphNodeId {
        self.node_id
    }

    pub fn incoming_type_ids(&self) -> &BTreeSet<GraphNodeId> {
        &self.incoming_type_ids
    }

    pub fn children(&self) -> &[VertexKey] {
        &self.children
    }

    pub fn is_multi_parent(&self) -> bool {
        self.is_multi_parent
    }

    pub fn multi_parent_depth(&self) -> u32 {
        self.multi_parent_depth
    }

    pub fn leaf_status(&self) -> LeafStatus {
        self.leaf_status
    }

    pub fn expanded(&self) -> bool {
        self.expanded
    }

    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn graphic(&self) -> VertexGraphic {
        self.graphic
    }

    pub fn has_defining_axioms(&self) -> bool {
        self.has_defining_axioms
    }

    pub fn cached_child_edges(&self) -> Option<&[Edge]> {
        self.cached_child_edges.as_deref()
    }

    pub fn fetch_generation(&self) -> u64 {
        self.fetch_generation
    }

    pub fn is_root(&self) -> bool {
        self.node_id == GraphNodeId::TREE_ROOT
    }

    /// Whether this vertex hangs directly off the sentinel root.
    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    /// Memoized leaf test.
    ///
    /// `Unknown` at `multi_parent_depth > 0` answers `Leaf`: multi-parent
    /// occurrences below the first are never expanded further. Otherwise
    /// the memoized child edges answer when present, else the navigator.
    pub fn is_leaf(&self, navigator: &Navigator) -> bool {
        match self.leaf_status {
            LeafStatus::Leaf => true,
            LeafStatus::NotLeaf => false,
            LeafStatus::Unknown => {
                if self.multi_parent_depth > 0 {
                    true
                } else if let Some(edges) = &self.cached_child_edges {
                    edges.is_empty()
                } else {
                    navigator.is_leaf(self.node_id)
                }
            }
        }
    }

    /// Whether this vertex should appear. The sentinel and top-level
    /// vertices always display; everything else asks the policy.
    pub fn should_display(&self, policy: &dyn DisplayPolicy, navigator: &Navigator) -> bool {
        self.is_root()
            || self.top_level
            || policy.should_display(&self.as_candidate(), navigator)
    }

    pub fn as_candidate(&self) -> CandidateVertex {
        CandidateVertex {
            node_id: self.node_id,
            incoming_type_ids: self.incoming_type_ids.clone(),
            display_text: self.display_text.clone(),
            has_defining_axioms: self.has_defining_axioms,
            is_multi_parent: self.is_multi_parent,
            multi_parent_depth: self.multi_parent_depth,
        }
    }
}

/// A fetched, policy-approved child ready for arena insertion.
#[derive(Debug, Clone)]
pub(crate) struct NewChild {
    pub(crate) candidate: CandidateVertex,
    pub(crate) graphic: VertexGraphic,
}

/// Result of clearing a vertex's children.
#[derive(Debug)]
pub(crate) struct ClearOutcome {
    /// Arena keys removed with the subtree, the cleared vertex excluded.
    pub(crate) removed: Vec<VertexKey>,
    /// The cleared vertex's generation after the bump.
    pub(crate) new_generation: u64,
}

/// Expansion state captured before a refresh, keyed by node id so it
/// survives the rebuild of every vertex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionSnapshot {
    pub expanded: HashSet<GraphNodeId>,
    pub selected: Option<GraphNodeId>,
}

/// The tree arena. Owned by the UI dispatcher; see module docs.
pub struct Tree {
    vertices: HashMap<VertexKey, GraphVertex>,
    root: VertexKey,
    selected: Option<VertexKey>,
    scroll_target: Option<VertexKey>,
    next_key: u64,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let root_key = VertexKey(0);
        let root = GraphVertex {
            key: root_key,
            parent: None,
            node_id: GraphNodeId::TREE_ROOT,
            incoming_type_ids: BTreeSet::new(),
            top_level: false,
            children: Vec::new(),
            is_multi_parent: false,
            multi_parent_depth: 0,
            mp_lineage: 0,
            leaf_status: LeafStatus::NotLeaf,
            expanded: true,
            display_text: String::new(),
            graphic: VertexGraphic::Unresolved,
            has_defining_axioms: false,
            cached_child_edges: None,
            fetch_generation: 0,
        };
        let mut vertices = HashMap::new();
        vertices.insert(root_key, root);
        Self {
            vertices,
            root: root_key,
            selected: None,
            scroll_target: None,
            next_key: 1,
        }
    }

    pub fn root(&self) -> VertexKey {
        self.root
    }

    pub fn vertex(&self, key: VertexKey) -> Option<&GraphVertex> {
        self.vertices.get(&key)
    }

    pub(crate) fn vertex_mut(&mut self, key: VertexKey) -> Option<&mut GraphVertex> {
        self.vertices.get_mut(&key)
    }

    pub fn children_of(&self, key: VertexKey) -> &[VertexKey] {
        self.vertices
            .get(&key)
            .map(|vertex| vertex.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn selected(&self) -> Option<VertexKey> {
        self.selected
    }

    pub fn scroll_target(&self) -> Option<VertexKey> {
        self.scroll_target
    }

    pub(crate) fn set_selected(&mut self, key: Option<VertexKey>) {
        self.selected = key;
    }

    pub(crate) fn set_scroll_target(&mut self, key: Option<VertexKey>) {
        self.scroll_target = key;
    }

    pub(crate) fn set_expanded(&mut self, key: VertexKey, expanded: bool) {
        if let Some(vertex) = self.vertices.get_mut(&key) {
            vertex.expanded = expanded;
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GraphVertex> {
        self.vertices.values()
    }

    /// Publish a completed fetch: memoize the child edges, attach the
    /// sorted survivors, mark the parent expanded. Returns the new keys in
    /// display order.
    pub(crate) fn apply_fetched_children(
        &mut self,
        parent: VertexKey,
        edges: Vec<Edge>,
        children: Vec<NewChild>,
    ) -> Vec<VertexKey> {
        let Some(parent_vertex) = self.vertices.get(&parent) else {
            return Vec::new();
        };
        let parent_lineage = parent_vertex.mp_lineage;
        let parent_is_root = parent_vertex.is_root();

        let mut keys = Vec::with_capacity(children.len());
        for child in children {
            let key = VertexKey(self.next_key);
            self.next_key += 1;
            let is_multi_parent = child.candidate.is_multi_parent;
            let vertex = GraphVertex {
                key,
                parent: Some(parent),
                node_id: child.candidate.node_id,
                incoming_type_ids: child.candidate.incoming_type_ids,
                top_level: parent_is_root,
                children: Vec::new(),
                is_multi_parent,
                multi_parent_depth: if is_multi_parent { parent_lineage } else { 0 },
                mp_lineage: parent_lineage + u32::from(is_multi_parent),
                leaf_status: LeafStatus::Unknown,
                expanded: false,
                display_text: child.candidate.display_text,
                graphic: child.graphic,
                has_defining_axioms: child.candidate.has_defining_axioms,
                cached_child_edges: None,
                fetch_generation: 0,
            };
            self.vertices.insert(key, vertex);
            keys.push(key);
        }

        if let Some(parent_vertex) = self.vertices.get_mut(&parent) {
            parent_vertex.leaf_status = if edges.is_empty() {
                LeafStatus::Leaf
            } else {
                LeafStatus::NotLeaf
            };
            parent_vertex.cached_child_edges = Some(edges);
            parent_vertex.children = keys.clone();
            parent_vertex.expanded = true;
        }
        keys
    }

    /// Remove the subtree below `key`, bump the vertex's fetch generation
    /// (invalidating any in-flight fetch) and collapse it back to
    /// unfetched: memoized edges and the leaf answer are dropped too, so
    /// the next fetch rebuilds from the current navigator. Selection and
    /// scroll target pointing into the removed subtree are dropped.
    pub(crate) fn clear_children(&mut self, key: VertexKey) -> Option<ClearOutcome> {
        let vertex = self.vertices.get_mut(&key)?;
        let mut frontier = std::mem::take(&mut vertex.children);
        vertex.fetch_generation += 1;
        vertex.expanded = false;
        vertex.cached_child_edges = None;
        vertex.leaf_status = LeafStatus::Unknown;
        let new_generation = vertex.fetch_generation;

        let mut removed = Vec::new();
        while let Some(child) = frontier.pop() {
            if let Some(vertex) = self.vertices.remove(&child) {
                frontier.extend(vertex.children);
                removed.push(child);
            }
        }

        if self.selected.is_some_and(|s| removed.contains(&s)) {
            self.selected = None;
        }
        if self.scroll_target.is_some_and(|s| removed.contains(&s)) {
            self.scroll_target = None;
        }

        Some(ClearOutcome {
            removed,
            new_generation,
        })
    }

    /// Recompute cached display attributes across the subtree at `key`.
    /// `recompute` returns `None` to leave a vertex unchanged.
    pub(crate) fn invalidate_subtree(
        &mut self,
        key: VertexKey,
        recompute: &mut dyn FnMut(&GraphVertex) -> Option<(String, VertexGraphic)>,
    ) {
        for target in self.subtree_keys(key) {
            let update = self
                .vertices
                .get(&target)
                .filter(|vertex| !vertex.is_root())
                .and_then(|vertex| recompute(vertex));
            if let (Some((display_text, graphic)), Some(vertex)) =
                (update, self.vertices.get_mut(&target))
            {
                vertex.display_text = display_text;
                vertex.graphic = graphic;
            }
        }
    }

    fn subtree_keys(&self, key: VertexKey) -> Vec<VertexKey> {
        let mut keys = Vec::new();
        let mut frontier = vec![key];
        while let Some(current) = frontier.pop() {
            if let Some(vertex) = self.vertices.get(&current) {
                keys.push(current);
                frontier.extend(vertex.children.iter().copied());
            }
        }
        keys
    }

    /// Depth-first search of the materialized tree for a node id, in
    /// display order.
    pub fn find_by_node_id(&self, node: GraphNodeId) -> Option<VertexKey> {
        let mut frontier = vec![self.root];
        while let Some(key) = frontier.pop() {
            let Some(vertex) = self.vertices.get(&key) else {
                continue;
            };
            if vertex.node_id == node {
                return Some(key);
            }
            frontier.extend(vertex.children.iter().rev().copied());
        }
        None
    }

    /// Among `parent`'s direct children, the first vertex materializing
    /// `node`.
    pub fn find_child_by_node_id(
        &self,
        parent: VertexKey,
        node: GraphNodeId,
    ) -> Option<VertexKey> {
        self.children_of(parent)
            .iter()
            .copied()
            .find(|&child| self.vertices.get(&child).is_some_and(|v| v.node_id == node))
    }

    /// Node-id set of every expanded vertex plus the current selection,
    /// captured before a refresh discards the arena.
    pub(crate) fn expansion_snapshot(&self) -> ExpansionSnapshot {
        let mut snapshot = ExpansionSnapshot::default();
        let mut frontier = vec![self.root];
        while let Some(key) = frontier.pop() {
            let Some(vertex) = self.vertices.get(&key) else {
                continue;
            };
            if vertex.expanded && !vertex.node_id.is_sentinel() {
                snapshot.expanded.insert(vertex.node_id);
            }
            frontier.extend(vertex.children.iter().copied());
        }
        snapshot.selected = self
            .selected
            .and_then(|key| self.vertices.get(&key))
            .map(|vertex| vertex.node_id);
        snapshot
    }
}

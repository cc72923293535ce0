/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Coordinate-scoped, read-only query facade over the concept graph.
//!
//! A `Navigator` is an immutable snapshot of query capability bound to one
//! coordinate: constructed once per coordinate change, discarded and
//! replaced on refresh, and safe for unsynchronized concurrent reads from
//! any number of fetch tasks. The degenerate empty variant stands in when
//! coordinate resolution fails, so the tree always has something to show.

use std::collections::HashSet;
use std::sync::Arc;

use crate::graph::{Coordinate, Edge, GraphNodeId, GraphSource};

/// Navigator construction failure.
#[derive(Debug, Clone)]
pub enum NavigatorError {
    CoordinateRejected { coordinate: Coordinate, reason: String },
}

impl std::fmt::Display for NavigatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigatorError::CoordinateRejected { coordinate, reason } => {
                write!(f, "coordinate {coordinate} rejected: {reason}")
            }
        }
    }
}

enum Inner {
    Bound {
        source: Arc<dyn GraphSource>,
        coordinate: Coordinate,
    },
    /// Fail-safe: empty results everywhere, a single unresolved root.
    Empty,
}

/// Read-only, coordinate-scoped view of the graph.
pub struct Navigator {
    inner: Inner,
}

impl Navigator {
    /// Bind a navigator to `coordinate`, validating it against the source
    /// first.
    pub fn build(
        source: Arc<dyn GraphSource>,
        coordinate: Coordinate,
    ) -> Result<Self, NavigatorError> {
        source
            .validate_coordinate(&coordinate)
            .map_err(|reason| NavigatorError::CoordinateRejected {
                coordinate: coordinate.clone(),
                reason,
            })?;
        Ok(Self {
            inner: Inner::Bound { source, coordinate },
        })
    }

    /// The degenerate navigator substituted when [`Navigator::build`]
    /// fails.
    pub fn empty() -> Self {
        Self { inner: Inner::Empty }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.inner, Inner::Empty)
    }

    /// The bound coordinate; `None` for the empty navigator.
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match &self.inner {
            Inner::Bound { coordinate, .. } => Some(coordinate),
            Inner::Empty => None,
        }
    }

    /// Typed outgoing links. No display-order guarantee.
    pub fn child_edges(&self, node: GraphNodeId) -> Vec<Edge> {
        match &self.inner {
            Inner::Bound { source, coordinate } => source.child_edges(node, coordinate),
            Inner::Empty => Vec::new(),
        }
    }

    /// Typed incoming links. No display-order guarantee.
    pub fn parent_edges(&self, node: GraphNodeId) -> Vec<Edge> {
        match &self.inner {
            Inner::Bound { source, coordinate } => source.parent_edges(node, coordinate),
            Inner::Empty => Vec::new(),
        }
    }

    pub fn child_ids(&self, node: GraphNodeId) -> Vec<GraphNodeId> {
        self.child_edges(node)
            .into_iter()
            .map(|edge| edge.destination)
            .collect()
    }

    pub fn parent_ids(&self, node: GraphNodeId) -> Vec<GraphNodeId> {
        self.parent_edges(node)
            .into_iter()
            .map(|edge| edge.destination)
            .collect()
    }

    pub fn is_leaf(&self, node: GraphNodeId) -> bool {
        self.child_edges(node).is_empty()
    }

    pub fn is_child_of(&self, child: GraphNodeId, parent: GraphNodeId) -> bool {
        self.child_edges(parent)
            .iter()
            .any(|edge| edge.destination == child)
    }

    /// Strict reachability test: `descendant` is reachable from `ancestor`
    /// through one or more child edges. A node is not its own descendant.
    pub fn is_descendant_of(&self, descendant: GraphNodeId, ancestor: GraphNodeId) -> bool {
        let mut visited = HashSet::new();
        let mut frontier = self.child_ids(ancestor);
        while let Some(node) = frontier.pop() {
            if node == descendant {
                return true;
            }
            if visited.insert(node) {
                frontier.extend(self.child_ids(node));
            }
        }
        false
    }

    /// Visible roots; the empty navigator serves a single sentinel.
    pub fn root_ids(&self) -> Vec<GraphNodeId> {
        match &self.inner {
            Inner::Bound { source, coordinate } => source.root_ids(coordinate),
            Inner::Empty => vec![GraphNodeId::UNRESOLVED],
        }
    }
}

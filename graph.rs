/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Identifier types, typed edges, and the collaborator seams of the
//! taxonomy tree: backing topology (`GraphSource`), concept text/status
//! queries (`ConceptQuery`), and the change-notification bus.
//!
//! Everything here is either immutable value types or `Send + Sync`
//! trait objects; fetch tasks call these concurrently without further
//! synchronization.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Identifier of a node in the backing concept graph.
///
/// Stable across coordinates: the same id names the same concept no matter
/// which view/version the tree is currently bound to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GraphNodeId(pub u64);

impl GraphNodeId {
    /// Sentinel id of the invisible tree-root vertex. Never a real node;
    /// never returned by a `GraphSource`.
    pub const TREE_ROOT: GraphNodeId = GraphNodeId(u64::MAX);

    /// Sentinel root id served by the empty navigator when coordinate
    /// resolution failed. Displayed as a single childless root.
    pub const UNRESOLVED: GraphNodeId = GraphNodeId(u64::MAX - 1);

    /// True for either sentinel.
    pub fn is_sentinel(self) -> bool {
        self == Self::TREE_ROOT || self == Self::UNRESOLVED
    }
}

impl std::fmt::Display for GraphNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            GraphNodeId::TREE_ROOT => write!(f, "(tree-root)"),
            GraphNodeId::UNRESOLVED => write!(f, "(unresolved)"),
            GraphNodeId(n) => write!(f, "#{n}"),
        }
    }
}

/// A typed, directed link to a destination node.
///
/// A node may be related to the same neighbor through more than one
/// relationship type, so the type ids are a set, not a single id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub destination: GraphNodeId,
    pub type_ids: BTreeSet<GraphNodeId>,
}

impl Edge {
    pub fn new(destination: GraphNodeId, type_ids: impl IntoIterator<Item = GraphNodeId>) -> Self {
        Self {
            destination,
            type_ids: type_ids.into_iter().collect(),
        }
    }

    /// Untyped edge — used for sentinel-root children, which have no
    /// incoming relationship.
    pub fn untyped(destination: GraphNodeId) -> Self {
        Self {
            destination,
            type_ids: BTreeSet::new(),
        }
    }
}

/// Viewing coordinate: the fixed filtering/versioning parameters a
/// navigator snapshot is bound to. Which edges and labels are visible is
/// entirely a function of `(node, coordinate)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    /// Named view configuration (e.g. an edition or branch).
    pub view: String,
    /// Version cut-off within the view; content introduced later is
    /// invisible at this coordinate.
    pub version: u64,
}

impl Coordinate {
    pub fn new(view: impl Into<String>, version: u64) -> Self {
        Self {
            view: view.into(),
            version,
        }
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Self::new("default", 0)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.view, self.version)
    }
}

/// Errors from the backing concept query service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    UnknownNode(GraphNodeId),
    Backend(String),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::UnknownNode(id) => write!(f, "unknown node {id}"),
            QueryError::Backend(e) => write!(f, "backend error: {e}"),
        }
    }
}

/// Topology of the concept graph as visible at a coordinate.
///
/// Implementations must be safe for unsynchronized concurrent calls from
/// multiple fetch tasks. No display-order guarantee on returned edges;
/// ordering is the caller's responsibility.
pub trait GraphSource: Send + Sync {
    /// Typed outgoing links of `node` visible at `coordinate`.
    fn child_edges(&self, node: GraphNodeId, coordinate: &Coordinate) -> Vec<Edge>;

    /// Typed incoming links of `node` visible at `coordinate`.
    fn parent_edges(&self, node: GraphNodeId, coordinate: &Coordinate) -> Vec<Edge>;

    /// Nodes with no visible parent at `coordinate`.
    fn root_ids(&self, coordinate: &Coordinate) -> Vec<GraphNodeId>;

    /// Reject coordinates this source cannot resolve (unknown view,
    /// malformed configuration). A navigator refuses to bind on error.
    fn validate_coordinate(&self, coordinate: &Coordinate) -> Result<(), String> {
        let _ = coordinate;
        Ok(())
    }
}

/// Text and definition-status queries for a concept at a coordinate.
///
/// Failures here are per-concept: a fetch drops the affected child and
/// continues, so implementations should return errors rather than panic.
pub trait ConceptQuery: Send + Sync {
    /// Preferred display text, or `None` when the concept has no
    /// description at this coordinate.
    fn description_text(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
    ) -> Result<Option<String>, QueryError>;

    /// Whether the concept carries defining axioms (drives the icon
    /// choice between defined and primitive).
    fn has_defining_axioms(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
    ) -> Result<bool, QueryError>;
}

/// Handle identifying one change-bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Change-notification bus: delivers the id of any node whose content
/// changed, in any version.
///
/// Registration is explicit both ways. Subscribers own an unbounded
/// receiver and must call [`ChangeBus::unsubscribe`] on shutdown; there are
/// no weak/GC semantics, a forgotten subscription leaks its sender slot.
pub struct ChangeBus {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::UnboundedSender<GraphNodeId>>>,
    next_id: AtomicU64,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber; returns its id and the delivery channel.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<GraphNodeId>) {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, tx);
        log::debug!("changes: subscriber {id:?} registered");
        (id, rx)
    }

    /// Remove a subscriber. Returns false when the id was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            log::debug!("changes: subscriber {id:?} unregistered");
        }
        removed
    }

    /// Deliver a changed node id to every live subscriber. Subscribers
    /// whose receiver is gone are dropped from the registry.
    pub fn publish(&self, node: GraphNodeId) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|id, tx| {
            let alive = tx.send(node).is_ok();
            if !alive {
                log::debug!("changes: dropping closed subscriber {id:?}");
            }
            alive
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

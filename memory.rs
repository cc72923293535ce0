/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! In-memory reference backend: a versioned concept graph backed by
//! `petgraph::StableGraph`, implementing both [`GraphSource`] and
//! [`ConceptQuery`].
//!
//! Content is versioned per record: a concept or link is visible at a
//! coordinate when `introduced_at <= coordinate.version` and it has not
//! been retired at or before that version. Mutations publish the affected
//! node id on the attached [`ChangeBus`], so change-driven refresh is
//! exercisable end to end without an external store.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::RwLock;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;
use std::sync::Arc;

use crate::graph::{
    ChangeBus, ConceptQuery, Coordinate, Edge, GraphNodeId, GraphSource, QueryError,
};

#[derive(Debug, Clone)]
struct ConceptRecord {
    id: GraphNodeId,
    description: String,
    defining_axioms: bool,
    introduced_at: u64,
    retired_at: Option<u64>,
}

#[derive(Debug, Clone)]
struct LinkRecord {
    type_ids: BTreeSet<GraphNodeId>,
    introduced_at: u64,
    retired_at: Option<u64>,
}

fn visible(introduced_at: u64, retired_at: Option<u64>, coordinate: &Coordinate) -> bool {
    introduced_at <= coordinate.version && retired_at.is_none_or(|r| r > coordinate.version)
}

struct MemoryInner {
    graph: StableGraph<ConceptRecord, LinkRecord>,
    index: HashMap<GraphNodeId, NodeIndex>,
    views: BTreeSet<String>,
    unreadable: HashSet<GraphNodeId>,
}

/// Versioned in-memory concept graph.
pub struct MemoryGraph {
    inner: RwLock<MemoryInner>,
    changes: Arc<ChangeBus>,
}

impl MemoryGraph {
    /// Empty graph knowing only the `"default"` view.
    pub fn new() -> Self {
        Self::with_views(["default"])
    }

    pub fn with_views<S: Into<String>>(views: impl IntoIterator<Item = S>) -> Self {
        Self {
            inner: RwLock::new(MemoryInner {
                graph: StableGraph::new(),
                index: HashMap::new(),
                views: views.into_iter().map(Into::into).collect(),
                unreadable: HashSet::new(),
            }),
            changes: Arc::new(ChangeBus::new()),
        }
    }

    pub fn change_bus(&self) -> Arc<ChangeBus> {
        Arc::clone(&self.changes)
    }

    /// Add a concept introduced at version 0.
    pub fn add_concept(&self, id: GraphNodeId, description: &str, defining_axioms: bool) {
        self.add_concept_at(id, description, defining_axioms, 0);
    }

    pub fn add_concept_at(
        &self,
        id: GraphNodeId,
        description: &str,
        defining_axioms: bool,
        version: u64,
    ) {
        let mut inner = self.inner.write();
        let record = ConceptRecord {
            id,
            description: description.to_string(),
            defining_axioms,
            introduced_at: version,
            retired_at: None,
        };
        let node = inner.graph.add_node(record);
        inner.index.insert(id, node);
    }

    /// Link `parent -> child`, introduced at version 0. Both endpoints must
    /// already exist; unknown endpoints are ignored with a debug log.
    pub fn link(
        &self,
        parent: GraphNodeId,
        child: GraphNodeId,
        type_ids: impl IntoIterator<Item = GraphNodeId>,
    ) {
        self.link_at(parent, child, type_ids, 0);
    }

    pub fn link_at(
        &self,
        parent: GraphNodeId,
        child: GraphNodeId,
        type_ids: impl IntoIterator<Item = GraphNodeId>,
        version: u64,
    ) {
        let mut inner = self.inner.write();
        let (Some(&from), Some(&to)) = (inner.index.get(&parent), inner.index.get(&child)) else {
            log::debug!("memory: link {parent} -> {child} skipped, unknown endpoint");
            return;
        };
        inner.graph.add_edge(
            from,
            to,
            LinkRecord {
                type_ids: type_ids.into_iter().collect(),
                introduced_at: version,
                retired_at: None,
            },
        );
    }

    /// Retire a concept from `version` onward and notify subscribers.
    pub fn retire_concept(&self, id: GraphNodeId, version: u64) {
        {
            let mut inner = self.inner.write();
            let Some(&node) = inner.index.get(&id) else {
                return;
            };
            if let Some(record) = inner.graph.node_weight_mut(node) {
                record.retired_at = Some(version);
            }
        }
        self.changes.publish(id);
    }

    /// Replace a concept's description and notify subscribers.
    pub fn set_description(&self, id: GraphNodeId, description: &str) {
        {
            let mut inner = self.inner.write();
            let Some(&node) = inner.index.get(&id) else {
                return;
            };
            if let Some(record) = inner.graph.node_weight_mut(node) {
                record.description = description.to_string();
            }
        }
        self.changes.publish(id);
    }

    /// Flip a concept's defining-axioms status and notify subscribers.
    pub fn set_defining_axioms(&self, id: GraphNodeId, defining_axioms: bool) {
        {
            let mut inner = self.inner.write();
            let Some(&node) = inner.index.get(&id) else {
                return;
            };
            if let Some(record) = inner.graph.node_weight_mut(node) {
                record.defining_axioms = defining_axioms;
            }
        }
        self.changes.publish(id);
    }

    /// Fault-injection hook: queries for `id` fail with a backend error
    /// until cleared. Topology stays visible, so the concept still appears
    /// as a candidate child and then gets dropped by the fetch.
    pub fn mark_unreadable(&self, id: GraphNodeId, unreadable: bool) {
        let mut inner = self.inner.write();
        if unreadable {
            inner.unreadable.insert(id);
        } else {
            inner.unreadable.remove(&id);
        }
    }

    fn visible_node(inner: &MemoryInner, id: GraphNodeId, coordinate: &Coordinate) -> Option<NodeIndex> {
        let &node = inner.index.get(&id)?;
        let record = inner.graph.node_weight(node)?;
        visible(record.introduced_at, record.retired_at, coordinate).then_some(node)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphSource for MemoryGraph {
    fn child_edges(&self, node: GraphNodeId, coordinate: &Coordinate) -> Vec<Edge> {
        self.directed_edges(node, coordinate, Direction::Outgoing)
    }

    fn parent_edges(&self, node: GraphNodeId, coordinate: &Coordinate) -> Vec<Edge> {
        self.directed_edges(node, coordinate, Direction::Incoming)
    }

    fn root_ids(&self, coordinate: &Coordinate) -> Vec<GraphNodeId> {
        let inner = self.inner.read();
        let mut roots: Vec<GraphNodeId> = inner
            .graph
            .node_indices()
            .filter_map(|node| {
                let record = inner.graph.node_weight(node)?;
                if !visible(record.introduced_at, record.retired_at, coordinate) {
                    return None;
                }
                let has_visible_parent = inner
                    .graph
                    .edges_directed(node, Direction::Incoming)
                    .any(|edge| {
                        let link = edge.weight();
                        let source = &inner.graph[edge.source()];
                        visible(link.introduced_at, link.retired_at, coordinate)
                            && visible(source.introduced_at, source.retired_at, coordinate)
                    });
                (!has_visible_parent).then_some(record.id)
            })
            .collect();
        roots.sort_unstable();
        roots
    }

    fn validate_coordinate(&self, coordinate: &Coordinate) -> Result<(), String> {
        let inner = self.inner.read();
        if inner.views.contains(&coordinate.view) {
            Ok(())
        } else {
            Err(format!("unknown view '{}'", coordinate.view))
        }
    }
}

impl MemoryGraph {
    fn directed_edges(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
        direction: Direction,
    ) -> Vec<Edge> {
        let inner = self.inner.read();
        let Some(node) = Self::visible_node(&inner, node, coordinate) else {
            return Vec::new();
        };
        inner
            .graph
            .edges_directed(node, direction)
            .filter_map(|edge| {
                let link = edge.weight();
                if !visible(link.introduced_at, link.retired_at, coordinate) {
                    return None;
                }
                let neighbor = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                let record = &inner.graph[neighbor];
                if !visible(record.introduced_at, record.retired_at, coordinate) {
                    return None;
                }
                Some(Edge {
                    destination: record.id,
                    type_ids: link.type_ids.clone(),
                })
            })
            .collect()
    }
}

impl ConceptQuery for MemoryGraph {
    fn description_text(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
    ) -> Result<Option<String>, QueryError> {
        let inner = self.inner.read();
        if inner.unreadable.contains(&node) {
            return Err(QueryError::Backend(format!("record {node} unreadable")));
        }
        match Self::visible_node(&inner, node, coordinate) {
            Some(index) => Ok(Some(inner.graph[index].description.clone())),
            None => Err(QueryError::UnknownNode(node)),
        }
    }

    fn has_defining_axioms(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
    ) -> Result<bool, QueryError> {
        let inner = self.inner.read();
        if inner.unreadable.contains(&node) {
            return Err(QueryError::Backend(format!("record {node} unreadable")));
        }
        match Self::visible_node(&inner, node, coordinate) {
            Some(index) => Ok(inner.graph[index].defining_axioms),
            None => Err(QueryError::UnknownNode(node)),
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use taxonomy_tree::{
    AlertReceiver, ConceptQuery, Coordinate, DisplayPolicy, GraphController, GraphNodeId,
    GraphSource, MemoryGraph, QueryError, ShowAllPolicy, TreeSettings, VertexKey,
};

pub(crate) fn id(n: u64) -> GraphNodeId {
    GraphNodeId(n)
}

/// A small animal taxonomy with two roots, one multi-parent node, and a
/// multi-parent node nested below another one:
///
/// ```text
/// animal #1 ── bird #2 ──── penguin #5
///          │            └── Colugo #8 ── relict #10
///          └─ mammal #3 ─── bat #6
///                        ├─ whale #7 ─── relict #10
///                        └─ Colugo #8 (again)
/// plant #4 ─── fern #9
/// ```
///
/// Every link is typed `#100`.
pub(crate) fn animal_graph() -> Arc<MemoryGraph> {
    let graph = MemoryGraph::new();
    for (n, description, defined) in [
        (1, "animal", true),
        (2, "bird", true),
        (3, "mammal", true),
        (4, "plant", true),
        (5, "penguin", false),
        (6, "bat", false),
        (7, "whale", false),
        (8, "Colugo", false),
        (9, "fern", false),
        (10, "relict", false),
    ] {
        graph.add_concept(id(n), description, defined);
    }
    for (parent, child) in [
        (1, 2),
        (1, 3),
        (2, 5),
        (2, 8),
        (3, 6),
        (3, 7),
        (3, 8),
        (4, 9),
        (8, 10),
        (7, 10),
    ] {
        graph.link(id(parent), id(child), [id(100)]);
    }
    Arc::new(graph)
}

pub(crate) struct Fixture {
    pub(crate) graph: Arc<MemoryGraph>,
    pub(crate) controller: GraphController,
    pub(crate) alerts: AlertReceiver,
}

pub(crate) async fn fixture() -> Fixture {
    fixture_with(animal_graph(), Arc::new(ShowAllPolicy)).await
}

pub(crate) async fn fixture_with(
    graph: Arc<MemoryGraph>,
    policy: Arc<dyn DisplayPolicy>,
) -> Fixture {
    let changes = graph.change_bus();
    let (controller, alerts) = GraphController::new(
        Arc::clone(&graph) as Arc<dyn GraphSource>,
        Arc::clone(&graph) as Arc<dyn ConceptQuery>,
        policy,
        changes,
        Coordinate::default(),
        TreeSettings::default(),
    )
    .await
    .expect("default settings are valid");
    Fixture {
        graph,
        controller,
        alerts,
    }
}

/// Like [`fixture`], but concept queries run through a [`GatedQuery`] so
/// tests can hold fetches mid-flight.
pub(crate) async fn gated_fixture() -> (Fixture, Gate) {
    let graph = animal_graph();
    let (query, gate) = GatedQuery::new(Arc::clone(&graph));
    let changes = graph.change_bus();
    let (controller, alerts) = GraphController::new(
        Arc::clone(&graph) as Arc<dyn GraphSource>,
        query,
        Arc::new(ShowAllPolicy),
        changes,
        Coordinate::default(),
        TreeSettings::default(),
    )
    .await
    .expect("default settings are valid");
    (
        Fixture {
            graph,
            controller,
            alerts,
        },
        gate,
    )
}

impl Fixture {
    /// Key of the top-level vertex materializing `node`. Panics when the
    /// root children are not fetched or the node is not among them.
    pub(crate) fn root_child(&self, node: GraphNodeId) -> VertexKey {
        self.controller
            .read(|tree| tree.find_child_by_node_id(tree.root(), node))
            .unwrap_or_else(|| panic!("{node} not materialized at top level"))
    }

    pub(crate) fn child(&self, parent: VertexKey, node: GraphNodeId) -> VertexKey {
        self.try_child(parent, node)
            .unwrap_or_else(|| panic!("{node} not materialized under {parent:?}"))
    }

    pub(crate) fn try_child(&self, parent: VertexKey, node: GraphNodeId) -> Option<VertexKey> {
        self.controller
            .read(|tree| tree.find_child_by_node_id(parent, node))
    }

    /// Node ids of `parent`'s children in display order.
    pub(crate) fn child_ids(&self, parent: VertexKey) -> Vec<GraphNodeId> {
        self.controller.read(|tree| {
            tree.children_of(parent)
                .iter()
                .filter_map(|&key| tree.vertex(key))
                .map(|vertex| vertex.node_id())
                .collect()
        })
    }

    /// Display texts of `parent`'s children in display order.
    pub(crate) fn child_texts(&self, parent: VertexKey) -> Vec<String> {
        self.controller.read(|tree| {
            tree.children_of(parent)
                .iter()
                .filter_map(|&key| tree.vertex(key))
                .map(|vertex| vertex.display_text().to_string())
                .collect()
        })
    }

    pub(crate) fn is_expanded(&self, key: VertexKey) -> bool {
        self.controller
            .read(|tree| tree.vertex(key).is_some_and(|vertex| vertex.expanded()))
    }

    pub(crate) fn selected_node(&self) -> Option<GraphNodeId> {
        self.controller.read(|tree| {
            tree.selected()
                .and_then(|key| tree.vertex(key))
                .map(|vertex| vertex.node_id())
        })
    }
}

/// Poll `cond` until it holds, panicking after five seconds.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Concept-query wrapper whose calls block while the gate is closed.
/// Blocking happens on the calling thread, so tests using it need a
/// multi-thread runtime with spare workers.
pub(crate) struct GatedQuery {
    inner: Arc<MemoryGraph>,
    gate: Arc<(Mutex<bool>, Condvar)>,
}

pub(crate) struct Gate(Arc<(Mutex<bool>, Condvar)>);

impl Gate {
    pub(crate) fn close(&self) {
        let (closed, _) = &*self.0;
        *closed.lock().unwrap() = true;
    }

    pub(crate) fn open(&self) {
        let (closed, wakeup) = &*self.0;
        *closed.lock().unwrap() = false;
        wakeup.notify_all();
    }
}

impl GatedQuery {
    /// Starts open.
    pub(crate) fn new(inner: Arc<MemoryGraph>) -> (Arc<Self>, Gate) {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        (
            Arc::new(Self {
                inner,
                gate: Arc::clone(&gate),
            }),
            Gate(gate),
        )
    }

    fn wait_for_gate(&self) {
        let (lock, wakeup) = &*self.gate;
        let mut closed = lock.lock().unwrap();
        while *closed {
            closed = wakeup.wait(closed).unwrap();
        }
    }
}

impl ConceptQuery for GatedQuery {
    fn description_text(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
    ) -> Result<Option<String>, QueryError> {
        self.wait_for_gate();
        self.inner.description_text(node, coordinate)
    }

    fn has_defining_axioms(
        &self,
        node: GraphNodeId,
        coordinate: &Coordinate,
    ) -> Result<bool, QueryError> {
        self.inner.has_defining_axioms(node, coordinate)
    }
}

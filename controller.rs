/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The tree controller: owns the sentinel root, the current navigator,
//! the fetch registry and fan-out limiter, the UI dispatcher, and the
//! change-listener worker.
//!
//! Change-triggered refresh is coarse-grained on purpose: any changed node
//! found in the materialized tree invalidates its subtree's cached display
//! attributes and then rebuilds the whole tree through the regular refresh
//! path. Expansion state survives the rebuild via an id-keyed snapshot.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::alert::{Alert, AlertReceiver, AlertSender, alert_channel};
use crate::dispatch::UiDispatcher;
use crate::display::DisplayPolicy;
use crate::fetch::{self, ChildFetcher, FetchRegistry};
use crate::graph::{
    ChangeBus, ConceptQuery, Coordinate, GraphNodeId, GraphSource, SubscriberId,
};
use crate::navigator::Navigator;
use crate::settings::{SettingsError, TreeSettings};
use crate::vertex::{ExpansionSnapshot, GraphVertex, LeafStatus, Tree, VertexKey};
use crate::walker;

/// Shared controller state, cloneable into dispatcher closures and worker
/// tasks.
pub(crate) struct ControllerInner {
    pub(crate) source: Arc<dyn GraphSource>,
    pub(crate) query: Arc<dyn ConceptQuery>,
    pub(crate) policy: Arc<dyn DisplayPolicy>,
    pub(crate) navigator: RwLock<Arc<Navigator>>,
    pub(crate) coordinate: RwLock<Coordinate>,
    pub(crate) ui: UiDispatcher,
    pub(crate) registry: Arc<FetchRegistry>,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) alerts: AlertSender,
}

enum WaitState {
    Ready,
    Missing,
    Pending(watch::Receiver<bool>),
}

impl ControllerInner {
    pub(crate) fn current_navigator(&self) -> Arc<Navigator> {
        Arc::clone(&self.navigator.read())
    }

    /// Schedule a fetch for `key` if it needs one. Runs on the dispatcher.
    fn schedule_fetch_locked(self: &Arc<Self>, tree: &mut Tree, key: VertexKey) {
        let (fetched, generation, node_id, parent_lineage) = {
            let Some(vertex) = tree.vertex(key) else {
                return;
            };
            (
                vertex.cached_child_edges().is_some(),
                vertex.fetch_generation(),
                vertex.node_id(),
                vertex.mp_lineage,
            )
        };
        if fetched {
            // Fetched is terminal until a clear, even when every child was
            // filtered out; expanding again is a pure flag flip.
            tree.set_expanded(key, true);
            return;
        }
        if self.registry.generation(key) == Some(generation) {
            // A stale registration (older generation) is overwritten below.
            log::trace!("controller: fetch for {node_id} already underway");
            return;
        }

        let (guard, cancelled) = self.registry.begin(key, generation);
        let fetcher = ChildFetcher {
            ui: self.ui.clone(),
            limiter: Arc::clone(&self.limiter),
            navigator: self.current_navigator(),
            query: Arc::clone(&self.query),
            policy: Arc::clone(&self.policy),
            key,
            node_id,
            generation,
            parent_lineage,
            guard,
            cancelled,
        };
        tokio::spawn(fetcher.run());
        log::trace!("controller: fetch scheduled for {node_id} (generation {generation})");
    }

    /// Asynchronous expand: no-op when children are already present or a
    /// fetch is underway.
    pub(crate) fn expand(self: &Arc<Self>, key: VertexKey) {
        let inner = Arc::clone(self);
        self.ui.dispatch(move |tree| inner.schedule_fetch_locked(tree, key));
    }

    /// Expand and block until the vertex's children are ready. Returns
    /// false when the vertex is gone, the fetch was superseded repeatedly,
    /// or the controller is shutting down — never hangs.
    pub(crate) async fn expand_and_wait(self: &Arc<Self>, key: VertexKey) -> bool {
        let mut waits = 0;
        loop {
            let inner = Arc::clone(self);
            let state = self
                .ui
                .dispatch_wait(move |tree| {
                    let Some(vertex) = tree.vertex(key) else {
                        return WaitState::Missing;
                    };
                    // Fetched (memoized edges present, children possibly
                    // all filtered), known leaf, or depth-limited: nothing
                    // to wait for.
                    if vertex.cached_child_edges().is_some()
                        || vertex.leaf_status() == LeafStatus::Leaf
                        || vertex.multi_parent_depth() > 0
                    {
                        return WaitState::Ready;
                    }
                    // Schedules a fresh fetch when none is underway at the
                    // current generation, then waits on whichever fetch is
                    // registered now.
                    inner.schedule_fetch_locked(tree, key);
                    match inner.registry.watch(key) {
                        Some(rx) => WaitState::Pending(rx),
                        None => WaitState::Ready,
                    }
                })
                .await;
            match state {
                None | Some(WaitState::Missing) => return false,
                Some(WaitState::Ready) => return true,
                Some(WaitState::Pending(rx)) => {
                    waits += 1;
                    if waits > 2 {
                        log::trace!("controller: giving up waiting on {key:?}");
                        return false;
                    }
                    fetch::await_completion(rx).await;
                }
            }
        }
    }

    /// Collapse: drop the subtree, bump the generation, wake waiters.
    pub(crate) fn collapse(&self, key: VertexKey) {
        let registry = Arc::clone(&self.registry);
        self.ui.dispatch(move |tree| {
            if let Some(outcome) = tree.clear_children(key) {
                registry.interrupt(key);
                for removed in outcome.removed {
                    registry.interrupt(removed);
                }
            }
        });
    }

    /// Full refresh: snapshot expansion, rebuild the navigator, refetch
    /// the root, restore expansion.
    pub(crate) async fn refresh(self: &Arc<Self>) {
        let Some(snapshot) = self.ui.dispatch_wait(|tree| tree.expansion_snapshot()).await
        else {
            return;
        };

        let coordinate = self.coordinate.read().clone();
        let navigator = match Navigator::build(Arc::clone(&self.source), coordinate.clone()) {
            Ok(navigator) => Arc::new(navigator),
            Err(e) => {
                log::warn!("controller: navigator rebuild failed ({e})");
                let _ = self.alerts.send(Alert::NavigatorUnavailable {
                    coordinate,
                    reason: e.to_string(),
                });
                Arc::new(Navigator::empty())
            }
        };
        *self.navigator.write() = Arc::clone(&navigator);

        let inner = Arc::clone(self);
        let Some(root) = self
            .ui
            .dispatch_wait(move |tree| {
                let root = tree.root();
                if let Some(outcome) = tree.clear_children(root) {
                    inner.registry.interrupt(root);
                    for removed in outcome.removed {
                        inner.registry.interrupt(removed);
                    }
                }
                inner.schedule_fetch_locked(tree, root);
                root
            })
            .await
        else {
            return;
        };

        if !self.expand_and_wait(root).await {
            return;
        }
        self.restore_expansion(root, snapshot).await;
        log::debug!("controller: refresh complete");
    }

    /// Re-expand every previously expanded node id still reachable; ids no
    /// longer present are silently pruned.
    async fn restore_expansion(self: &Arc<Self>, root: VertexKey, snapshot: ExpansionSnapshot) {
        let expanded = Arc::new(snapshot.expanded);
        let mut frontier = self
            .ui
            .dispatch_wait(move |tree| tree.children_of(root).to_vec())
            .await
            .unwrap_or_default();

        while let Some(key) = frontier.pop() {
            let expanded_set = Arc::clone(&expanded);
            let wants_expansion = self
                .ui
                .dispatch_wait(move |tree| {
                    tree.vertex(key)
                        .is_some_and(|v| expanded_set.contains(&v.node_id()))
                })
                .await
                .unwrap_or(false);
            if !wants_expansion {
                continue;
            }
            if !self.expand_and_wait(key).await {
                continue;
            }
            self.ui.dispatch(move |tree| tree.set_expanded(key, true));
            let children = self
                .ui
                .dispatch_wait(move |tree| tree.children_of(key).to_vec())
                .await
                .unwrap_or_default();
            frontier.extend(children);
        }

        if let Some(selected) = snapshot.selected {
            // Awaited so the restored selection is visible once refresh
            // returns.
            self.ui
                .dispatch_wait(move |tree| {
                    let key = tree.find_by_node_id(selected);
                    tree.set_selected(key);
                })
                .await;
        }
    }

    /// Change-notification handling: search the materialized tree for the
    /// node; on a hit, recompute cached display attributes across the
    /// subtree, then run the full refresh.
    pub(crate) async fn invalidate_and_refresh(self: &Arc<Self>, node: GraphNodeId) {
        let inner = Arc::clone(self);
        let hit = self
            .ui
            .dispatch_wait(move |tree| {
                let Some(key) = tree.find_by_node_id(node) else {
                    return false;
                };
                let navigator = inner.current_navigator();
                let query = Arc::clone(&inner.query);
                let policy = Arc::clone(&inner.policy);
                let mut recompute = move |vertex: &GraphVertex| {
                    let coordinate = navigator.coordinate()?.clone();
                    let node_id = vertex.node_id();
                    let display_text = match query.description_text(node_id, &coordinate) {
                        Ok(Some(text)) => text,
                        Ok(None) => node_id.to_string(),
                        Err(e) => {
                            log::debug!("controller: invalidate skipped {node_id} ({e})");
                            return None;
                        }
                    };
                    let mut candidate = vertex.as_candidate();
                    candidate.display_text = display_text.clone();
                    candidate.has_defining_axioms = query
                        .has_defining_axioms(node_id, &coordinate)
                        .unwrap_or(candidate.has_defining_axioms);
                    let graphic = policy.compute_graphic(&candidate, &navigator);
                    Some((display_text, graphic))
                };
                tree.invalidate_subtree(key, &mut recompute);
                true
            })
            .await
            .unwrap_or(false);

        if hit {
            log::debug!("controller: change to {node} triggers full refresh");
            self.refresh().await;
        }
    }
}

/// Public controller handle. Construct with [`GraphController::new`], tear
/// down with [`GraphController::shutdown`] — the change subscription is
/// explicit and must be released.
pub struct GraphController {
    inner: Arc<ControllerInner>,
    workers: JoinSet<()>,
    cancel: CancellationToken,
    changes: Arc<ChangeBus>,
    subscription: Option<SubscriberId>,
}

impl GraphController {
    /// Build the controller, subscribe to changes, and run the initial
    /// refresh (navigator bind + root fetch). Returns the alert stream
    /// alongside the controller.
    pub async fn new(
        source: Arc<dyn GraphSource>,
        query: Arc<dyn ConceptQuery>,
        policy: Arc<dyn DisplayPolicy>,
        changes: Arc<ChangeBus>,
        coordinate: Coordinate,
        settings: TreeSettings,
    ) -> Result<(Self, AlertReceiver), SettingsError> {
        settings.validate()?;

        let cancel = CancellationToken::new();
        let (ui, drain) = UiDispatcher::channel(cancel.child_token());
        let mut workers = JoinSet::new();
        workers.spawn(drain);

        let (alerts, alerts_rx) = alert_channel();
        let inner = Arc::new(ControllerInner {
            source,
            query,
            policy,
            navigator: RwLock::new(Arc::new(Navigator::empty())),
            coordinate: RwLock::new(coordinate),
            ui,
            registry: Arc::new(FetchRegistry::new()),
            limiter: Arc::new(Semaphore::new(settings.fetch_fan_out)),
            alerts,
        });

        let (subscription, changes_rx) = changes.subscribe();
        workers.spawn(change_listener(
            Arc::clone(&inner),
            changes_rx,
            cancel.child_token(),
        ));

        let controller = Self {
            inner,
            workers,
            cancel,
            changes,
            subscription: Some(subscription),
        };
        controller.inner.refresh().await;
        Ok((controller, alerts_rx))
    }

    /// The sentinel root vertex.
    pub fn root(&self) -> VertexKey {
        self.inner.ui.read(|tree| tree.root())
    }

    pub fn current_navigator(&self) -> Arc<Navigator> {
        self.inner.current_navigator()
    }

    pub fn coordinate(&self) -> Coordinate {
        self.inner.coordinate.read().clone()
    }

    /// Read-only view of the materialized tree.
    pub fn read<R>(&self, read: impl FnOnce(&Tree) -> R) -> R {
        self.inner.ui.read(read)
    }

    /// UI expand event: populate children lazily.
    pub fn expand(&self, key: VertexKey) {
        self.inner.expand(key);
    }

    /// Synchronous variant for callers already off the UI thread that need
    /// the children now.
    pub async fn expand_and_wait(&self, key: VertexKey) -> bool {
        self.inner.expand_and_wait(key).await
    }

    /// UI collapse event: drop the subtree back to unfetched.
    pub fn collapse(&self, key: VertexKey) {
        self.inner.collapse(key);
    }

    /// Rebuild the tree against the current coordinate, preserving
    /// expansion state where possible.
    pub async fn refresh(&self) {
        self.inner.refresh().await;
    }

    /// Switch viewing coordinate and refresh.
    pub async fn set_coordinate(&self, coordinate: Coordinate) {
        *self.inner.coordinate.write() = coordinate;
        self.inner.refresh().await;
    }

    /// Walk a root-first node-id path, expanding each level, and select
    /// the final vertex. Emits one alert and mutates nothing when the path
    /// does not match the tree.
    pub async fn expand_and_select(&self, path: &[GraphNodeId]) -> bool {
        walker::walk(&self.inner, path).await
    }

    /// Reveal a concept: compute its ancestor chain and walk it.
    pub async fn show_concept(&self, node: GraphNodeId) -> bool {
        let navigator = self.inner.current_navigator();
        let chain = walker::ancestor_chain(&navigator, node);
        self.expand_and_select(&chain).await
    }

    /// Unsubscribe from changes, cancel workers, wake every fetch waiter,
    /// and join the worker set.
    pub async fn shutdown(mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.changes.unsubscribe(subscription);
        }
        self.cancel.cancel();
        self.inner.registry.interrupt_all();
        self.inner.limiter.close();
        while self.workers.join_next().await.is_some() {}
        log::debug!("controller: shutdown complete");
    }
}

/// Worker: receives changed node ids and drives invalidate-and-refresh.
async fn change_listener(
    inner: Arc<ControllerInner>,
    mut changes: mpsc::UnboundedReceiver<GraphNodeId>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("controller: change listener cancelled");
                break;
            }
            changed = changes.recv() => {
                match changed {
                    None => break,
                    Some(node) => inner.invalidate_and_refresh(node).await,
                }
            }
        }
    }
}

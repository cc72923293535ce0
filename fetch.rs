/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Background child fetching.
//!
//! One fetch per vertex at a time, registered in the [`FetchRegistry`]
//! together with the vertex generation it was scheduled against. The fetch
//! computes candidate children concurrently under a shared fan-out
//! limiter, filters them through the display policy, sorts survivors, and
//! publishes on the UI dispatcher — where the publish is applied only if
//! the vertex generation still matches. Cancellation is cooperative:
//! clearing a vertex bumps its generation and interrupts the completion
//! watch; no task is forcibly stopped.
//!
//! The completion watch is signalled on every exit path (success, stale
//! discard, error, task drop) via [`FetchGuard`], so a waiter blocked on a
//! fetch can never hang.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

use crate::dispatch::UiDispatcher;
use crate::display::{CandidateVertex, DisplayPolicy};
use crate::graph::{ConceptQuery, Edge, GraphNodeId, QueryError};
use crate::navigator::Navigator;
use crate::vertex::{NewChild, VertexKey};

struct FetchTicket {
    generation: u64,
    done: watch::Sender<bool>,
}

/// Active fetch per vertex: last-writer-wins on register, explicit remove
/// on completion. Owned by the controller, never ambient.
pub(crate) struct FetchRegistry {
    active: Mutex<HashMap<VertexKey, FetchTicket>>,
}

impl FetchRegistry {
    pub(crate) fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fetch for `key` at `generation`. A superseded ticket is
    /// simply overwritten; its watch closes, waking old waiters.
    pub(crate) fn begin(
        self: &Arc<Self>,
        key: VertexKey,
        generation: u64,
    ) -> (FetchGuard, watch::Receiver<bool>) {
        let (done, rx) = watch::channel(false);
        self.active.lock().insert(key, FetchTicket { generation, done });
        (
            FetchGuard {
                registry: Arc::clone(self),
                key,
                generation,
            },
            rx,
        )
    }

    pub(crate) fn is_active(&self, key: VertexKey) -> bool {
        self.active.lock().contains_key(&key)
    }

    /// Generation of the registered fetch for `key`, if any.
    pub(crate) fn generation(&self, key: VertexKey) -> Option<u64> {
        self.active.lock().get(&key).map(|ticket| ticket.generation)
    }

    /// Completion watch of the current fetch for `key`, if any.
    pub(crate) fn watch(&self, key: VertexKey) -> Option<watch::Receiver<bool>> {
        self.active.lock().get(&key).map(|ticket| ticket.done.subscribe())
    }

    /// Wake waiters without deregistering: the cancellation path. The
    /// fetch itself deregisters later through its guard.
    pub(crate) fn interrupt(&self, key: VertexKey) {
        if let Some(ticket) = self.active.lock().get(&key) {
            let _ = ticket.done.send(true);
        }
    }

    /// Shutdown path: wake every waiter.
    pub(crate) fn interrupt_all(&self) {
        for ticket in self.active.lock().values() {
            let _ = ticket.done.send(true);
        }
    }

    fn finish(&self, key: VertexKey, generation: u64) {
        let ticket = {
            let mut active = self.active.lock();
            match active.get(&key) {
                Some(ticket) if ticket.generation == generation => active.remove(&key),
                _ => None,
            }
        };
        if let Some(ticket) = ticket {
            let _ = ticket.done.send(true);
        }
    }
}

/// Deregisters the fetch and signals its completion watch when dropped —
/// the finally-equivalent of the fetch pipeline.
pub(crate) struct FetchGuard {
    registry: Arc<FetchRegistry>,
    key: VertexKey,
    generation: u64,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.registry.finish(self.key, self.generation);
    }
}

/// Block until the fetch behind `rx` completes, is interrupted, or its
/// ticket is superseded (watch closed).
pub(crate) async fn await_completion(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|done| *done).await;
}

/// One scheduled child fetch. Everything needed was captured on the
/// dispatcher at schedule time; the fetch never reads mutable vertex state
/// again until publish.
pub(crate) struct ChildFetcher {
    pub(crate) ui: UiDispatcher,
    pub(crate) limiter: Arc<Semaphore>,
    pub(crate) navigator: Arc<Navigator>,
    pub(crate) query: Arc<dyn ConceptQuery>,
    pub(crate) policy: Arc<dyn DisplayPolicy>,
    pub(crate) key: VertexKey,
    pub(crate) node_id: GraphNodeId,
    pub(crate) generation: u64,
    /// Parent's multi-parent lineage count, seed for child depth.
    pub(crate) parent_lineage: u32,
    pub(crate) guard: FetchGuard,
    pub(crate) cancelled: watch::Receiver<bool>,
}

impl ChildFetcher {
    pub(crate) async fn run(self) {
        let ChildFetcher {
            ui,
            limiter,
            navigator,
            query,
            policy,
            key,
            node_id,
            generation,
            parent_lineage,
            guard,
            cancelled,
        } = self;

        // Always queried against the navigator captured at schedule time;
        // memoized edges on the vertex are bookkeeping, not a fetch cache.
        let edges = if node_id == GraphNodeId::TREE_ROOT {
            navigator
                .root_ids()
                .into_iter()
                .map(Edge::untyped)
                .collect()
        } else {
            navigator.child_edges(node_id)
        };

        // Cooperative cancellation check before fanning out sub-work.
        if *cancelled.borrow() {
            log::trace!("fetch: {node_id} superseded before fan-out");
            drop(guard);
            return;
        }

        let from_root = node_id == GraphNodeId::TREE_ROOT;
        let mut subtasks: JoinSet<Option<SortableChild>> = JoinSet::new();
        for edge in edges.iter().cloned() {
            let limiter = Arc::clone(&limiter);
            let navigator = Arc::clone(&navigator);
            let query = Arc::clone(&query);
            let policy = Arc::clone(&policy);
            subtasks.spawn(async move {
                let Ok(_permit) = limiter.acquire_owned().await else {
                    // Limiter closed: controller shutdown.
                    return None;
                };
                build_candidate(
                    &navigator,
                    query.as_ref(),
                    policy.as_ref(),
                    edge,
                    parent_lineage,
                    from_root,
                )
            });
        }

        let mut survivors = Vec::with_capacity(edges.len());
        while let Some(joined) = subtasks.join_next().await {
            match joined {
                Ok(Some(child)) => survivors.push(child),
                Ok(None) => {}
                Err(e) => log::debug!("fetch: child task for {node_id} failed ({e})"),
            }
        }

        // Deterministic, locale-stable ordering: case-folded display text,
        // ties broken by node id.
        survivors.sort_by(|a, b| {
            a.sort_key
                .cmp(&b.sort_key)
                .then(a.child.candidate.node_id.cmp(&b.child.candidate.node_id))
        });
        let children: Vec<NewChild> = survivors.into_iter().map(|s| s.child).collect();
        let count = children.len();

        let published = ui
            .dispatch_wait(move |tree| {
                let Some(vertex) = tree.vertex(key) else {
                    return false;
                };
                if vertex.fetch_generation() != generation {
                    return false;
                }
                tree.apply_fetched_children(key, edges, children);
                true
            })
            .await;

        match published {
            Some(true) => log::trace!("fetch: published {count} children for {node_id}"),
            Some(false) => log::trace!("fetch: stale results for {node_id} discarded"),
            None => log::trace!("fetch: dispatcher gone, {node_id} results dropped"),
        }
        drop(guard);
    }
}

struct SortableChild {
    sort_key: String,
    child: NewChild,
}

fn build_candidate(
    navigator: &Navigator,
    query: &dyn ConceptQuery,
    policy: &dyn DisplayPolicy,
    edge: Edge,
    parent_lineage: u32,
    from_root: bool,
) -> Option<SortableChild> {
    let node_id = edge.destination;
    match candidate_attributes(navigator, query, edge, parent_lineage) {
        Ok(candidate) => {
            // Root vertices always display.
            if !from_root && !policy.should_display(&candidate, navigator) {
                log::debug!("fetch: {} filtered by display policy", candidate.node_id);
                return None;
            }
            let graphic = policy.compute_graphic(&candidate, navigator);
            Some(SortableChild {
                sort_key: candidate.display_text.to_lowercase(),
                child: NewChild { candidate, graphic },
            })
        }
        Err(e) => {
            // Per-child failures never abort the fetch.
            log::debug!("fetch: child {node_id} omitted ({e})");
            None
        }
    }
}

fn candidate_attributes(
    navigator: &Navigator,
    query: &dyn ConceptQuery,
    edge: Edge,
    parent_lineage: u32,
) -> Result<CandidateVertex, QueryError> {
    let node_id = edge.destination;
    let is_multi_parent = navigator.parent_ids(node_id).len() > 1;
    let multi_parent_depth = if is_multi_parent { parent_lineage } else { 0 };

    let (display_text, has_defining_axioms) = match navigator.coordinate() {
        Some(coordinate) => {
            let text = query
                .description_text(node_id, coordinate)?
                .unwrap_or_else(|| node_id.to_string());
            (text, query.has_defining_axioms(node_id, coordinate)?)
        }
        // Empty navigator: sentinel content only, nothing to query.
        None => (node_id.to_string(), false),
    };

    Ok(CandidateVertex {
        node_id,
        incoming_type_ids: edge.type_ids,
        display_text,
        has_defining_axioms,
        is_multi_parent,
        multi_parent_depth,
    })
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! UI-thread marshaling: a single dispatcher task drains a channel of tree
//! mutations, so every structural write is serialized in submission order.
//!
//! Background fetchers and walkers never touch the tree directly; they
//! submit closures here and, when they need the result, await it through
//! [`UiDispatcher::dispatch_wait`]. Read access for rendering and tests
//! goes through the shared read lock, which the dispatcher only holds for
//! the duration of one closure.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::vertex::Tree;

type TreeTask = Box<dyn FnOnce(&mut Tree) + Send + 'static>;

/// Handle for submitting tree mutations to the dispatcher task.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::UnboundedSender<TreeTask>,
    shared: Arc<RwLock<Tree>>,
}

impl UiDispatcher {
    /// Create the dispatcher and its drain future. The caller spawns the
    /// future on its worker set; the loop exits on cancellation or when
    /// every handle is dropped.
    pub fn channel(cancel: CancellationToken) -> (Self, impl Future<Output = ()> + Send) {
        let shared = Arc::new(RwLock::new(Tree::new()));
        let (tx, mut rx) = mpsc::unbounded_channel::<TreeTask>();
        let drain_shared = Arc::clone(&shared);
        let drain = async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::debug!("dispatch: cancelled, dropping pending tree tasks");
                        break;
                    }
                    task = rx.recv() => {
                        let Some(task) = task else { break };
                        let mut tree = drain_shared.write();
                        task(&mut tree);
                    }
                }
            }
        };
        (Self { tx, shared }, drain)
    }

    /// Queue a tree mutation; fire-and-forget. Dropped with a debug log
    /// when the dispatcher has already stopped.
    pub fn dispatch(&self, task: impl FnOnce(&mut Tree) + Send + 'static) {
        if self.tx.send(Box::new(task)).is_err() {
            log::debug!("dispatch: tree task dropped, dispatcher stopped");
        }
    }

    /// Queue a tree mutation and await its result. `None` when the
    /// dispatcher has shut down before running the closure.
    pub async fn dispatch_wait<R, F>(&self, task: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Tree) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.dispatch(move |tree| {
            let _ = tx.send(task(tree));
        });
        rx.await.ok()
    }

    /// Read-only access to the current tree.
    pub fn read<R>(&self, read: impl FnOnce(&Tree) -> R) -> R {
        read(&self.shared.read())
    }
}

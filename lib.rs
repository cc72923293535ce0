/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Taxonomy tree navigator: presents a directed-acyclic, multi-parent
//! concept graph as a conventional expandable tree, fetching subtrees
//! lazily and concurrently.
//!
//! Core pieces:
//! - [`navigator::Navigator`]: immutable, coordinate-scoped query facade
//! - [`vertex::Tree`] / [`vertex::GraphVertex`]: the materialized tree —
//!   one vertex per distinct parent path, never shared by reference
//! - [`controller::GraphController`]: root ownership, expand/collapse,
//!   refresh with expansion restore, change subscription
//! - [`walker`]: ancestor-chain computation and reveal-in-tree
//!
//! Concurrency model: a single dispatcher task owns all structural tree
//! writes; background fetchers compute children under a shared fan-out
//! limiter and publish through the dispatcher, guarded by a per-vertex
//! fetch generation. Superseded fetches discard silently; completion
//! watches are signalled on every exit path so waiters never hang.

pub mod alert;
pub mod controller;
pub mod dispatch;
pub mod display;
mod fetch;
pub mod graph;
pub mod memory;
pub mod navigator;
pub mod settings;
pub mod vertex;
pub mod walker;

pub use alert::{Alert, AlertReceiver};
pub use controller::GraphController;
pub use display::{CandidateVertex, DisplayPolicy, ShowAllPolicy, TypeFilterPolicy, VertexGraphic};
pub use graph::{
    ChangeBus, ConceptQuery, Coordinate, Edge, GraphNodeId, GraphSource, QueryError,
};
pub use memory::MemoryGraph;
pub use navigator::{Navigator, NavigatorError};
pub use settings::TreeSettings;
pub use vertex::{GraphVertex, LeafStatus, Tree, VertexKey};

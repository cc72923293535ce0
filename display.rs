/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Pluggable visibility and icon decisions for candidate vertices.

use std::collections::BTreeSet;

use crate::graph::GraphNodeId;
use crate::navigator::Navigator;

/// Icon choice for one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexGraphic {
    Defined,
    Primitive,
    DefinedMultiParent,
    PrimitiveMultiParent,
    Unresolved,
}

/// The attributes a display policy sees for one candidate vertex, computed
/// by the fetch before the vertex is admitted into the tree.
#[derive(Debug, Clone)]
pub struct CandidateVertex {
    pub node_id: GraphNodeId,
    pub incoming_type_ids: BTreeSet<GraphNodeId>,
    pub display_text: String,
    pub has_defining_axioms: bool,
    pub is_multi_parent: bool,
    pub multi_parent_depth: u32,
}

/// Visibility/icon decision for a single vertex.
///
/// `should_display` is consulted once per candidate during a fetch; a
/// `false` drops the candidate silently (debug log, not an error). Root
/// vertices bypass the policy and always display.
pub trait DisplayPolicy: Send + Sync {
    fn should_display(&self, candidate: &CandidateVertex, navigator: &Navigator) -> bool;

    fn compute_graphic(&self, candidate: &CandidateVertex, navigator: &Navigator) -> VertexGraphic {
        let _ = navigator;
        if candidate.node_id == GraphNodeId::UNRESOLVED {
            VertexGraphic::Unresolved
        } else {
            match (candidate.has_defining_axioms, candidate.is_multi_parent) {
                (true, false) => VertexGraphic::Defined,
                (true, true) => VertexGraphic::DefinedMultiParent,
                (false, false) => VertexGraphic::Primitive,
                (false, true) => VertexGraphic::PrimitiveMultiParent,
            }
        }
    }
}

/// Shows every candidate; the default policy.
pub struct ShowAllPolicy;

impl DisplayPolicy for ShowAllPolicy {
    fn should_display(&self, _candidate: &CandidateVertex, _navigator: &Navigator) -> bool {
        true
    }
}

/// Shows only candidates linked to their tree-parent through one of the
/// allowed relationship types. Sentinel-root children carry no incoming
/// types and are left to the root-bypass in the fetch.
pub struct TypeFilterPolicy {
    allowed: BTreeSet<GraphNodeId>,
}

impl TypeFilterPolicy {
    pub fn new(allowed: impl IntoIterator<Item = GraphNodeId>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl DisplayPolicy for TypeFilterPolicy {
    fn should_display(&self, candidate: &CandidateVertex, _navigator: &Navigator) -> bool {
        candidate
            .incoming_type_ids
            .iter()
            .any(|type_id| self.allowed.contains(type_id))
    }
}

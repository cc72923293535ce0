/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Structured user-facing alerts.
//!
//! The controller never raises dialogs itself; it emits typed alerts on an
//! unbounded channel and the embedding UI decides how to present them.
//! Cancellation and stale-fetch discard are deliberately absent here —
//! they are expected outcomes, logged at trace level only.

use tokio::sync::mpsc;

use crate::graph::{Coordinate, GraphNodeId};

/// One user-visible problem report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    /// Navigator construction failed; the tree fell back to the empty
    /// navigator and shows a single unresolved root.
    NavigatorUnavailable {
        coordinate: Coordinate,
        reason: String,
    },
    /// An expansion path could not be walked: `missing` was not found in
    /// the materialized tree while revealing `target`.
    ExpansionPathBroken {
        target: GraphNodeId,
        missing: GraphNodeId,
    },
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Alert::NavigatorUnavailable { coordinate, reason } => {
                write!(f, "taxonomy unavailable at {coordinate}: {reason}")
            }
            Alert::ExpansionPathBroken { target, missing } => {
                write!(f, "cannot reveal {target}: {missing} is not in the tree")
            }
        }
    }
}

pub type AlertSender = mpsc::UnboundedSender<Alert>;
pub type AlertReceiver = mpsc::UnboundedReceiver<Alert>;

pub fn alert_channel() -> (AlertSender, AlertReceiver) {
    mpsc::unbounded_channel()
}

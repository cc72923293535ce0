/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios driving a [`taxonomy_tree::GraphController`]
//! against the in-memory backend.

mod harness;

mod expansion;
mod polyhierarchy;
mod refresh;

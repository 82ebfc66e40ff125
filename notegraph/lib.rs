/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! NoteGraph: tree-graph layout and state-synchronization engine for a
//! code-annotation note editor.
//!
//! The host editor owns text buffers, decorations, and panel hosting; this
//! crate owns the domain logic on top:
//! - `graph`: node/edge model, cycle detection, tree layout, visibility,
//!   and the mutation operations over a note document
//! - `store`: the panel-side working-copy service that applies messages,
//!   reruns layout, and emits subscriber events
//! - `sync`: the host ↔ panel message protocol, ID allocation, debouncing,
//!   and text-change caching
//! - `persistence`: the serialized note document shape and its storage adapter
//! - `config`: layout spacing and timing settings

pub mod config;
pub mod graph;
pub mod persistence;
pub mod store;
pub mod sync;

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Cycle detection over the handle-based adjacency model.
//!
//! Run before committing any new edge: connecting or splicing is rejected
//! whenever the candidate edge set contains a cycle under the port-directed
//! traversal rules (left/top predecessors, group parent, right/bottom
//! successors, group chain entry).

use std::collections::HashMap;

use super::{Edge, Note, NodeId, Port, handle};

/// Handle-keyed lookup maps over an edge set.
struct PortMaps<'a> {
    /// target_handle -> edge
    incoming: HashMap<&'a str, &'a Edge>,
    /// source_handle -> edge
    outgoing: HashMap<&'a str, &'a Edge>,
}

impl<'a> PortMaps<'a> {
    fn build(edges: &'a [Edge]) -> Self {
        let mut incoming = HashMap::with_capacity(edges.len());
        let mut outgoing = HashMap::with_capacity(edges.len());
        for edge in edges {
            incoming.insert(edge.target_handle.as_str(), edge);
            outgoing.insert(edge.source_handle.as_str(), edge);
        }
        Self { incoming, outgoing }
    }

    fn predecessor(&self, node: &str, port: Port) -> Option<&'a NodeId> {
        self.incoming.get(handle(node, port).as_str()).map(|e| &e.source)
    }

    fn successor(&self, node: &str, port: Port) -> Option<&'a NodeId> {
        self.outgoing.get(handle(node, port).as_str()).map(|e| &e.target)
    }
}

/// Returns true if `edges` contains a cycle under the port traversal rules.
///
/// `note` supplies group parents and chain membership; `edges` is passed
/// separately so callers can test a candidate edge set before committing it.
pub fn has_cycle(note: &Note, edges: &[Edge]) -> bool {
    let maps = PortMaps::build(edges);

    for edge in edges {
        // A self-edge is trivially a cycle; the lookback guard below would
        // skip it because every neighbor of its node is the node itself.
        if edge.source == edge.target {
            return true;
        }
        let mut path_to: HashMap<NodeId, NodeId> = HashMap::new();
        path_to.insert(edge.source.clone(), edge.source.clone());
        if walk(note, &maps, &edge.source, &edge.source, &mut path_to) {
            return true;
        }
    }
    false
}

/// Neighbors of `id` in fixed priority order: left predecessor, top
/// predecessor, the group parent when neither exists, right successor,
/// bottom successor, and a group's first chain member.
fn neighbors(note: &Note, maps: &PortMaps<'_>, id: &str) -> Vec<NodeId> {
    let mut out = Vec::with_capacity(4);

    let left = maps.predecessor(id, Port::Left);
    let top = maps.predecessor(id, Port::Top);
    if let Some(pred) = left {
        out.push(pred.clone());
    }
    if let Some(pred) = top {
        out.push(pred.clone());
    }
    if left.is_none() && top.is_none() {
        if let Some(parent) = note.node(id).and_then(|n| n.parent_id.clone()) {
            out.push(parent);
        }
    }

    if let Some(succ) = maps.successor(id, Port::Right) {
        out.push(succ.clone());
    }
    if let Some(succ) = maps.successor(id, Port::Bottom) {
        out.push(succ.clone());
    }

    if let Some(first) = note.node(id).and_then(|n| n.chain()).and_then(|c| c.first()) {
        out.push(first.clone());
    }

    out
}

fn walk(
    note: &Note,
    maps: &PortMaps<'_>,
    id: &str,
    prev: &str,
    path_to: &mut HashMap<NodeId, NodeId>,
) -> bool {
    for next in neighbors(note, maps, id) {
        // One-step lookback: bouncing straight back along the edge we
        // arrived on is not a cycle.
        if next == prev {
            continue;
        }
        if path_to.contains_key(next.as_str()) {
            return true;
        }
        path_to.insert(next.clone(), id.to_string());
        if walk(note, maps, &next, id, path_to) {
            return true;
        }
    }
    false
}

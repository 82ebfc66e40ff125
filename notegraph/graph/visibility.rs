/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Visibility resolution for collapsed groups.
//!
//! A collapsed ("render as group") chain shows exactly one member — the
//! active step — in place of the whole chain. This module walks the logical
//! tree from the roots, collecting everything that should be shown; the
//! complement (minus an explicit keep-list) is hidden.

use std::collections::HashSet;

use super::{EdgeId, Note, NodeId, Port};

/// Node and edge ids that should not be rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HiddenSets {
    pub nodes: HashSet<NodeId>,
    pub edges: HashSet<EdgeId>,
}

impl HiddenSets {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// Compute the hidden node/edge sets for the current group collapse state.
///
/// `keep_ids` is an always-visible allowlist (e.g. a transient template node
/// during a connection drag).
pub fn hidden_sets(note: &Note, keep_ids: &[NodeId]) -> HiddenSets {
    let mut shown_nodes: HashSet<NodeId> = HashSet::new();
    let mut shown_edges: HashSet<EdgeId> = HashSet::new();

    let mut roots: Vec<&NodeId> = note
        .node_map
        .keys()
        .filter(|id| is_root(note, id))
        .collect();
    roots.sort();

    for root in roots {
        show(note, root, &mut shown_nodes, &mut shown_edges);
    }

    // An incoming top/left edge is only shown when both of its endpoints
    // are; a collapsed chain's internal edges stay hidden with the members.
    shown_edges.retain(|eid| {
        note.edge(eid)
            .map(|e| shown_nodes.contains(&e.source) && shown_nodes.contains(&e.target))
            .unwrap_or(false)
    });

    let mut hidden = HiddenSets::default();
    for id in note.node_map.keys() {
        if !shown_nodes.contains(id) && !keep_ids.contains(id) {
            hidden.nodes.insert(id.clone());
        }
    }
    for edge in &note.edges {
        let endpoint_hidden =
            hidden.nodes.contains(&edge.source) || hidden.nodes.contains(&edge.target);
        if !shown_edges.contains(&edge.id) && endpoint_hidden {
            hidden.edges.insert(edge.id.clone());
        }
    }
    hidden
}

fn is_root(note: &Note, id: &str) -> bool {
    note.incoming(id, Port::Left).is_none()
        && note.incoming(id, Port::Top).is_none()
        && note.node(id).map(|n| n.parent_id.is_none()).unwrap_or(false)
}

/// Pre-order walk of the logical tree, accumulating shown nodes and each
/// node's top/left incoming edge.
fn show(note: &Note, id: &str, nodes: &mut HashSet<NodeId>, edges: &mut HashSet<EdgeId>) {
    if !nodes.insert(id.to_string()) {
        return;
    }

    for port in [Port::Top, Port::Left] {
        if let Some(edge) = note.incoming(id, port) {
            edges.insert(edge.id.clone());
        }
    }

    let Some(node) = note.node(id) else {
        return;
    };

    if node.is_group() {
        if node.render_as_group() {
            if let Some(step) = node.active_step() {
                let step = step.clone();
                show(note, &step, nodes, edges);
            }
        } else if let Some(chain) = node.chain() {
            let chain: Vec<NodeId> = chain.to_vec();
            for member in &chain {
                show(note, member, nodes, edges);
            }
        }
    }

    for port in [Port::Right, Port::Bottom] {
        if let Some(edge) = note.outgoing(id, port) {
            let target = edge.target.clone();
            // Internal edges of a collapsed chain must not pull inactive
            // members back into view.
            if note.suppressed_member(&target) {
                continue;
            }
            show(note, &target, nodes, edges);
        }
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph mutation operations.
//!
//! Each operation is an atomic transform over the note document: every
//! precondition is checked before the first write, so a rejected operation
//! leaves the document untouched. Callers rerun layout (and visibility when
//! collapse state changed) after any operation that returns `Ok`.

use std::fmt;

use euclid::default::Point2D;
use log::debug;

use super::cycle::has_cycle;
use super::layout::LayoutSettings;
use super::{Edge, Node, NodeId, NodePayload, Note, Port};
use crate::sync::ids::{IdError, IdSource};

/// Where a new node attaches relative to the active node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Horizontal `right → left` relation.
    Detail,
    /// Vertical `bottom → top` relation.
    Next,
}

impl Direction {
    fn ports(self) -> (Port, Port) {
        match self {
            Direction::Detail => (Port::Right, Port::Left),
            Direction::Next => (Port::Bottom, Port::Top),
        }
    }
}

/// Expected user-action failures. These abort the operation with no state
/// change and are surfaced as warnings, never as crashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    WouldCycle,
    InvalidConnection,
    PortOccupied { node: NodeId, port: Port },
    AmbiguousDelete,
    SelectionNotChained,
    AlreadyGrouped(NodeId),
    NotAGroup,
    UnknownNode(NodeId),
    StepOutOfRange { step: usize, len: usize },
    IdAllocation(IdError),
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::WouldCycle => write!(f, "Connection would create a cycle"),
            OpError::InvalidConnection => {
                write!(f, "Only right-to-left or bottom-to-top connections are allowed")
            },
            OpError::PortOccupied { node, port } => {
                write!(f, "Node {node} already has an incoming edge on its {port} port")
            },
            OpError::AmbiguousDelete => write!(
                f,
                "Cannot delete a node whose incoming and outgoing edges are on different axes"
            ),
            OpError::SelectionNotChained => {
                write!(f, "Selection must form an unbroken vertical chain")
            },
            OpError::AlreadyGrouped(id) => {
                write!(f, "Node {id} already belongs to a group")
            },
            OpError::NotAGroup => write!(f, "Selection is not a single group node"),
            OpError::UnknownNode(id) => write!(f, "Unknown node {id}"),
            OpError::StepOutOfRange { step, len } => {
                write!(f, "Step {step} out of range for a chain of {len}")
            },
            OpError::IdAllocation(e) => write!(f, "Id allocation failed: {e}"),
        }
    }
}

impl From<IdError> for OpError {
    fn from(e: IdError) -> Self {
        OpError::IdAllocation(e)
    }
}

/// Insert a new node next to the active node.
///
/// The new node is offset from the active node by its box size plus the
/// configured gap. If the active node already has an outgoing edge on the
/// insertion port, the new node is spliced between it and the old successor.
///
/// Returns `Ok(None)` (a deliberate no-op) when the graph is non-empty but
/// no active node is set: the insertion point would be ambiguous.
pub fn add_node(
    note: &mut Note,
    direction: Direction,
    payload: NodePayload,
    settings: &LayoutSettings,
    ids: &mut dyn IdSource,
) -> Result<Option<NodeId>, OpError> {
    if note.node_map.is_empty() {
        let mut minted = ids.alloc(1)?;
        let id = minted.remove(0);
        let node = Node::new(id.clone(), Point2D::zero(), payload);
        note.node_map.insert(id.clone(), node);
        note.active_node_id = Some(id.clone());
        return Ok(Some(id));
    }

    let Some(active_id) = note.active_node_id.clone() else {
        debug!("add_node skipped: no active node in a non-empty graph");
        return Ok(None);
    };
    let active = note
        .node(&active_id)
        .ok_or_else(|| OpError::UnknownNode(active_id.clone()))?;

    let (out_port, in_port) = direction.ports();
    let offset = match direction {
        Direction::Detail => Point2D::new(
            active.width.unwrap_or(settings.default_width) + settings.gap_x,
            0.0,
        ),
        Direction::Next => Point2D::new(
            0.0,
            active.height.unwrap_or(settings.default_height) + settings.gap_y,
        ),
    };
    let position = active.position + offset.to_vector();

    let mut minted = ids.alloc(2)?;
    let node_id = minted.remove(0);
    let edge_id = minted.remove(0);

    // Splice between the active node and its current successor, if any.
    if let Some(existing) = note.outgoing(&active_id, out_port).map(|e| e.id.clone()) {
        if let Some(edge) = note.edges.iter_mut().find(|e| e.id == existing) {
            edge.set_source(&node_id);
        }
    }

    let node = Node::new(node_id.clone(), position, payload);
    note.node_map.insert(node_id.clone(), node);
    note.edges.push(Edge::new(
        edge_id,
        active_id.as_str(),
        out_port,
        node_id.as_str(),
        in_port,
    ));
    note.active_node_id = Some(node_id.clone());

    Ok(Some(node_id))
}

/// Commit a drag-to-connect gesture.
///
/// Only the two sanctioned port pairings are accepted; the target port must
/// be free; the resulting edge set must stay acyclic. An existing edge out
/// of the same source port is replaced.
pub fn connect(
    note: &mut Note,
    source: &str,
    source_port: Port,
    target: &str,
    target_port: Port,
    ids: &mut dyn IdSource,
) -> Result<(), OpError> {
    let valid = matches!(
        (source_port, target_port),
        (Port::Right, Port::Left) | (Port::Bottom, Port::Top)
    );
    if !valid {
        return Err(OpError::InvalidConnection);
    }
    if note.node(source).is_none() {
        return Err(OpError::UnknownNode(source.to_string()));
    }
    if note.node(target).is_none() {
        return Err(OpError::UnknownNode(target.to_string()));
    }
    if note.incoming(target, target_port).is_some() {
        return Err(OpError::PortOccupied {
            node: target.to_string(),
            port: target_port,
        });
    }

    let replaced = note.outgoing(source, source_port).map(|e| e.id.clone());

    let mut minted = ids.alloc(1)?;
    let candidate = Edge::new(minted.remove(0), source, source_port, target, target_port);

    // Trial edge set: current edges minus the replaced one plus the candidate.
    let mut trial: Vec<Edge> = note
        .edges
        .iter()
        .filter(|e| Some(&e.id) != replaced.as_ref())
        .cloned()
        .collect();
    trial.push(candidate.clone());

    if has_cycle(note, &trial) {
        return Err(OpError::WouldCycle);
    }

    if let Some(old_id) = replaced {
        note.remove_edge(&old_id);
    }
    note.edges.push(candidate);
    Ok(())
}

/// Order a multi-selection into a contiguous vertical chain.
///
/// Fails if any member is already grouped, or the selection has no single
/// head, breaks apart, or branches off the bottom-to-top path.
fn order_chain(note: &Note, selection: &[NodeId]) -> Result<Vec<NodeId>, OpError> {
    if selection.len() < 2 {
        return Err(OpError::SelectionNotChained);
    }
    for id in selection {
        let node = note
            .node(id)
            .ok_or_else(|| OpError::UnknownNode(id.clone()))?;
        if node.parent_id.is_some() {
            return Err(OpError::AlreadyGrouped(id.clone()));
        }
    }

    // The head is the unique member whose top predecessor is outside the
    // selection.
    let mut heads = selection.iter().filter(|id| {
        note.incoming(id, Port::Top)
            .map(|e| !selection.contains(&e.source))
            .unwrap_or(true)
    });
    let head = heads.next().ok_or(OpError::SelectionNotChained)?.clone();
    if heads.next().is_some() {
        return Err(OpError::SelectionNotChained);
    }

    let mut chain = vec![head.clone()];
    let mut cur = head;
    while let Some(next) = note.outgoing(&cur, Port::Bottom).map(|e| e.target.clone()) {
        if !selection.contains(&next) {
            break;
        }
        chain.push(next.clone());
        cur = next;
    }

    if chain.len() != selection.len() {
        return Err(OpError::SelectionNotChained);
    }
    Ok(chain)
}

/// Merge a contiguous vertical chain of selected nodes into a group node.
///
/// Members are reparented (positions become group-relative) and the chain's
/// boundary edges are rewired to the group: the head's incoming left/top
/// edge now targets the group, the tail's outgoing bottom edge now
/// originates from it.
pub fn group_nodes(
    note: &mut Note,
    selection: &[NodeId],
    ids: &mut dyn IdSource,
) -> Result<NodeId, OpError> {
    let chain = order_chain(note, selection)?;
    let head = chain[0].clone();
    let tail = chain[chain.len() - 1].clone();

    let head_pos = note
        .resolved_position(&head)
        .ok_or_else(|| OpError::UnknownNode(head.clone()))?;

    let mut minted = ids.alloc(1)?;
    let group_id = minted.remove(0);

    let group = Node::new(
        group_id.clone(),
        head_pos,
        NodePayload::Scrolly {
            text: String::new(),
            chain: chain.clone(),
            render_as_group: false,
            step_index: 0,
        },
    );
    note.node_map.insert(group_id.clone(), group);

    for member in &chain {
        if let Some(node) = note.node_mut(member) {
            node.parent_id = Some(group_id.clone());
            node.position -= head_pos.to_vector();
        }
    }

    // Boundary rewiring: external edges in and out of the chain now meet
    // the group node instead.
    for port in [Port::Left, Port::Top] {
        if let Some(id) = note.incoming(&head, port).map(|e| e.id.clone()) {
            if let Some(edge) = note.edges.iter_mut().find(|e| e.id == id) {
                edge.set_target(&group_id);
            }
        }
    }
    if let Some(id) = note.outgoing(&tail, Port::Bottom).map(|e| e.id.clone()) {
        if let Some(edge) = note.edges.iter_mut().find(|e| e.id == id) {
            edge.set_source(&group_id);
        }
    }

    note.active_node_id = Some(group_id.clone());
    Ok(group_id)
}

/// Dissolve a group back into its members.
///
/// The current selection must be exactly the group node. Members get their
/// absolute positions back and the boundary edges are rewired to the first
/// and last chain members directly.
pub fn split_group(note: &mut Note, selection: &[NodeId]) -> Result<(), OpError> {
    let [group_id] = selection else {
        return Err(OpError::NotAGroup);
    };
    let group = note
        .node(group_id)
        .ok_or_else(|| OpError::UnknownNode(group_id.clone()))?;
    if !group.is_group() {
        return Err(OpError::NotAGroup);
    }

    let chain: Vec<NodeId> = group.chain().map(|c| c.to_vec()).unwrap_or_default();
    let step = group.active_step().cloned();
    let group_pos = note
        .resolved_position(group_id)
        .ok_or_else(|| OpError::UnknownNode(group_id.clone()))?;

    for member in &chain {
        if let Some(node) = note.node_mut(member) {
            node.parent_id = None;
            node.position += group_pos.to_vector();
        }
    }

    let first = chain.first().cloned();
    let last = chain.last().cloned();
    let rewires: Vec<(String, bool)> = note
        .edges
        .iter()
        .filter(|e| e.source == *group_id || e.target == *group_id)
        .map(|e| (e.id.clone(), e.source == *group_id))
        .collect();
    for (edge_id, outgoing) in rewires {
        let Some(edge) = note.edges.iter_mut().find(|e| e.id == edge_id) else {
            continue;
        };
        if outgoing {
            // The bottom edge returns to the tail; the right (detail) edge
            // returns to the step member it logically belongs to.
            let replacement = match edge.source_port() {
                Some(Port::Bottom) => last.clone(),
                _ => step.clone().or_else(|| first.clone()),
            };
            if let Some(node) = replacement {
                edge.set_source(&node);
            }
        } else if let Some(node) = first.clone() {
            edge.set_target(&node);
        }
    }

    note.node_map.remove(group_id);
    note.active_node_id = first;
    Ok(())
}

/// Delete a node, bridging its predecessor and successor when both exist.
///
/// Allowed only when the node has at most one incoming and one outgoing
/// edge, on the same axis: removing an axis-corner node would ambiguously
/// reconnect a horizontal predecessor to a vertical successor.
pub fn delete_node(note: &mut Note, id: &str, ids: &mut dyn IdSource) -> Result<(), OpError> {
    if note.node(id).is_none() {
        return Err(OpError::UnknownNode(id.to_string()));
    }

    let incoming: Vec<Edge> = note.edges.iter().filter(|e| e.target == id).cloned().collect();
    let outgoing: Vec<Edge> = note.edges.iter().filter(|e| e.source == id).cloned().collect();
    if incoming.len() > 1 || outgoing.len() > 1 {
        return Err(OpError::AmbiguousDelete);
    }

    let horizontal = |p: Option<Port>| matches!(p, Some(Port::Left) | Some(Port::Right));
    if let (Some(inc), Some(out)) = (incoming.first(), outgoing.first()) {
        if horizontal(inc.target_port()) != horizontal(out.source_port()) {
            return Err(OpError::AmbiguousDelete);
        }
    }

    let bridge = match (incoming.first(), outgoing.first()) {
        (Some(inc), Some(out)) => {
            let mut minted = ids.alloc(1)?;
            Some(Edge::new(
                minted.remove(0),
                inc.source.as_str(),
                inc.source_port().unwrap_or(Port::Right),
                out.target.as_str(),
                out.target_port().unwrap_or(Port::Left),
            ))
        },
        _ => None,
    };

    note.edges.retain(|e| e.source != id && e.target != id);
    if let Some(edge) = bridge {
        note.edges.push(edge);
    }

    // Splice out of a containing chain, clamping the group's step index.
    if let Some((group_id, idx)) = note.chain_of(id).map(|(g, i)| (g.clone(), i)) {
        if let Some(NodePayload::Scrolly {
            chain, step_index, ..
        }) = note.node_mut(&group_id).map(|n| &mut n.payload)
        {
            chain.remove(idx);
            if *step_index >= chain.len() && !chain.is_empty() {
                *step_index = chain.len() - 1;
            }
        }
    }

    note.node_map.remove(id);
    if note.active_node_id.as_deref() == Some(id) {
        note.active_node_id = incoming.first().map(|e| e.source.clone());
    }
    Ok(())
}

/// Flip a group between expanded and collapsed ("render as group") mode.
///
/// Exactly one edge is rewired: the chain's outgoing right (detail) edge
/// originates from the group node while collapsed and from the active chain
/// member while expanded. Callers refresh visibility and rerun layout.
pub fn toggle_render_as_group(note: &mut Note, group_id: &str) -> Result<bool, OpError> {
    let group = note
        .node(group_id)
        .ok_or_else(|| OpError::UnknownNode(group_id.to_string()))?;
    if !group.is_group() {
        return Err(OpError::NotAGroup);
    }
    let step = group.active_step().cloned();
    let collapsed = !group.render_as_group();

    if let Some(NodePayload::Scrolly {
        render_as_group, ..
    }) = note.node_mut(group_id).map(|n| &mut n.payload)
    {
        *render_as_group = collapsed;
    }

    rewire_detail_edge(note, group_id, step.as_deref(), collapsed);
    Ok(collapsed)
}

/// Advance (or rewind) a collapsed group's active step.
pub fn set_step_index(note: &mut Note, group_id: &str, step: usize) -> Result<(), OpError> {
    let group = note
        .node(group_id)
        .ok_or_else(|| OpError::UnknownNode(group_id.to_string()))?;
    let Some(chain) = group.chain() else {
        return Err(OpError::NotAGroup);
    };
    if step >= chain.len() {
        return Err(OpError::StepOutOfRange {
            step,
            len: chain.len(),
        });
    }
    let collapsed = group.render_as_group();
    let new_step = chain[step].clone();

    if let Some(NodePayload::Scrolly { step_index, .. }) =
        note.node_mut(group_id).map(|n| &mut n.payload)
    {
        *step_index = step;
    }

    rewire_detail_edge(note, group_id, Some(&new_step), collapsed);
    Ok(())
}

/// Point the chain's outgoing right edge at the group (collapsed) or at the
/// active step member (expanded).
fn rewire_detail_edge(note: &mut Note, group_id: &str, step: Option<&str>, collapsed: bool) {
    let chain: Vec<NodeId> = note
        .node(group_id)
        .and_then(|n| n.chain())
        .map(|c| c.to_vec())
        .unwrap_or_default();

    let owner = note.edges.iter().find(|e| {
        e.source_port() == Some(Port::Right)
            && (e.source == group_id || chain.contains(&e.source))
    });
    let Some(edge_id) = owner.map(|e| e.id.clone()) else {
        return;
    };

    let new_source = if collapsed {
        Some(group_id.to_string())
    } else {
        step.map(|s| s.to_string())
    };
    if let (Some(source), Some(edge)) = (
        new_source,
        note.edges.iter_mut().find(|e| e.id == edge_id),
    ) {
        edge.set_source(&source);
    }
}

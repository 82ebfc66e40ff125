/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph data structures for the note editor.
//!
//! Core structures:
//! - `Note`: the persisted aggregate (node map + edge list + active node)
//! - `Node`: a positioned vertex carrying a code, text, group, or template payload
//! - `Edge`: a directed connection between two node ports
//! - `Port`: one of the four fixed connection points (top/left incoming,
//!   right/bottom outgoing)
//!
//! Nodes are owned by id in a `HashMap`, never by reference; every traversal
//! goes through id indirection.

use std::collections::HashMap;
use std::fmt;

use euclid::default::Point2D;
use serde::{Deserialize, Serialize};

pub mod cycle;
pub mod layout;
pub mod ops;
pub mod visibility;

/// Stable node identity. Ids are minted by the host's counter and are
/// plain strings on the wire.
pub type NodeId = String;

/// Stable edge identity.
pub type EdgeId = String;

/// Current on-disk document version. Version 1 used the legacy
/// `blockMap`/`activeBlockId` field names.
pub const NOTE_VERSION: u32 = 2;

/// A connection port on a node. `Top` and `Left` receive edges;
/// `Right` and `Bottom` originate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Port {
    Top,
    Left,
    Right,
    Bottom,
}

impl Port {
    /// Wire spelling used inside handle strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Port::Top => "top",
            Port::Left => "left",
            Port::Right => "right",
            Port::Bottom => "bottom",
        }
    }

    /// Parse the port suffix of a handle string.
    pub fn parse(s: &str) -> Option<Port> {
        match s {
            "top" => Some(Port::Top),
            "left" => Some(Port::Left),
            "right" => Some(Port::Right),
            "bottom" => Some(Port::Bottom),
            _ => None,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build a handle string of the form `{node_id}-{port}`.
pub fn handle(node: &str, port: Port) -> String {
    format!("{node}-{port}")
}

/// Parse a handle string back into `(node_id, port)`. The node id may itself
/// contain hyphens, so only the last segment is treated as the port.
pub fn parse_handle(s: &str) -> Option<(&str, Port)> {
    let (node, port) = s.rsplit_once('-')?;
    Some((node, Port::parse(port)?))
}

/// Node type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Code,
    Text,
    Scrolly,
    Template,
}

/// An inclusive line range captured from a source file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

/// Type-specific payload carried by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodePayload {
    /// A highlighted code snippet captured from a source file.
    #[serde(rename_all = "camelCase")]
    Code {
        text: String,
        file_path: String,
        pkg_path: String,
        ranges: Vec<LineRange>,
    },

    /// A markdown-like text block.
    Text { text: String },

    /// A group ("scrolly") node owning an ordered chain of member ids.
    #[serde(rename_all = "camelCase")]
    Scrolly {
        text: String,
        chain: Vec<NodeId>,
        render_as_group: bool,
        step_index: usize,
    },

    /// A transient placeholder node (e.g. a ghost during connection drag).
    Template,
}

/// A positioned graph vertex.
///
/// A node with `parent_id` set stores its position relative to that parent's
/// resolved position; all other nodes store absolute positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    pub position: Point2D<f32>,

    /// Explicit size override; falls back to the type default from settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,

    /// Set only for chain members nested inside a group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,

    #[serde(flatten)]
    pub payload: NodePayload,
}

impl Node {
    /// Create a node with no size override and no parent.
    pub fn new(id: impl Into<NodeId>, position: Point2D<f32>, payload: NodePayload) -> Self {
        Self {
            id: id.into(),
            position,
            width: None,
            height: None,
            parent_id: None,
            payload,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.payload {
            NodePayload::Code { .. } => NodeKind::Code,
            NodePayload::Text { .. } => NodeKind::Text,
            NodePayload::Scrolly { .. } => NodeKind::Scrolly,
            NodePayload::Template => NodeKind::Template,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self.payload, NodePayload::Code { .. })
    }

    pub fn is_text(&self) -> bool {
        matches!(self.payload, NodePayload::Text { .. })
    }

    pub fn is_group(&self) -> bool {
        matches!(self.payload, NodePayload::Scrolly { .. })
    }

    pub fn is_template(&self) -> bool {
        matches!(self.payload, NodePayload::Template)
    }

    /// The ordered member list, for group nodes.
    pub fn chain(&self) -> Option<&[NodeId]> {
        match &self.payload {
            NodePayload::Scrolly { chain, .. } => Some(chain),
            _ => None,
        }
    }

    pub fn chain_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.payload {
            NodePayload::Scrolly { chain, .. } => Some(chain),
            _ => None,
        }
    }

    /// Whether this group is collapsed ("render as group"). False for
    /// non-group nodes.
    pub fn render_as_group(&self) -> bool {
        match &self.payload {
            NodePayload::Scrolly {
                render_as_group, ..
            } => *render_as_group,
            _ => false,
        }
    }

    /// Index of the active chain step. Zero for non-group nodes.
    pub fn step_index(&self) -> usize {
        match &self.payload {
            NodePayload::Scrolly { step_index, .. } => *step_index,
            _ => 0,
        }
    }

    /// The currently active chain member of a group node.
    pub fn active_step(&self) -> Option<&NodeId> {
        match &self.payload {
            NodePayload::Scrolly {
                chain, step_index, ..
            } => chain.get(*step_index),
            _ => None,
        }
    }

    /// Free-form text carried by text and group payloads.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            NodePayload::Code { text, .. } => Some(text),
            NodePayload::Text { text } => Some(text),
            NodePayload::Scrolly { text, .. } => Some(text),
            NodePayload::Template => None,
        }
    }

    pub fn set_text(&mut self, new_text: String) {
        match &mut self.payload {
            NodePayload::Code { text, .. } => *text = new_text,
            NodePayload::Text { text } => *text = new_text,
            NodePayload::Scrolly { text, .. } => *text = new_text,
            NodePayload::Template => {},
        }
    }
}

/// A directed connection between two node ports.
///
/// `source_handle`/`target_handle` follow the `{node_id}-{port}` convention.
/// `right → left` is the horizontal ("detail") relation; `bottom → top` is
/// the vertical ("next") relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub source_handle: String,
    pub target_handle: String,
}

impl Edge {
    /// Build an edge, deriving both handle strings from the port pair.
    pub fn new(
        id: impl Into<EdgeId>,
        source: impl Into<NodeId>,
        source_port: Port,
        target: impl Into<NodeId>,
        target_port: Port,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: id.into(),
            source_handle: handle(&source, source_port),
            target_handle: handle(&target, target_port),
            source,
            target,
        }
    }

    /// The port this edge leaves from, parsed from the source handle.
    pub fn source_port(&self) -> Option<Port> {
        parse_handle(&self.source_handle).map(|(_, p)| p)
    }

    /// The port this edge arrives at, parsed from the target handle.
    pub fn target_port(&self) -> Option<Port> {
        parse_handle(&self.target_handle).map(|(_, p)| p)
    }

    /// Re-point the source end at a different node, keeping the port.
    pub fn set_source(&mut self, node: &str) {
        let port = self.source_port().unwrap_or(Port::Right);
        self.source = node.to_string();
        self.source_handle = handle(node, port);
    }

    /// Re-point the target end at a different node, keeping the port.
    pub fn set_target(&mut self, node: &str) {
        let port = self.target_port().unwrap_or(Port::Left);
        self.target = node.to_string();
        self.target_handle = handle(node, port);
    }
}

/// The top-level persisted aggregate: one note document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub pkg_path: String,
    pub node_map: HashMap<NodeId, Node>,
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_node_id: Option<NodeId>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_version() -> u32 {
    NOTE_VERSION
}

impl Note {
    /// Create an empty note document.
    pub fn new(id: impl Into<String>, title: impl Into<String>, pkg_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            pkg_path: pkg_path.into(),
            node_map: HashMap::new(),
            edges: Vec::new(),
            active_node_id: None,
            version: NOTE_VERSION,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_map.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.node_map.get_mut(id)
    }

    /// The edge arriving at `(node, port)`, if any. Each port accepts at
    /// most one incoming edge.
    pub fn incoming(&self, node: &str, port: Port) -> Option<&Edge> {
        let h = handle(node, port);
        self.edges.iter().find(|e| e.target_handle == h)
    }

    /// The edge leaving `(node, port)`, if any.
    pub fn outgoing(&self, node: &str, port: Port) -> Option<&Edge> {
        let h = handle(node, port);
        self.edges.iter().find(|e| e.source_handle == h)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(idx))
    }

    /// The group that `id` is a chain member of, together with its index in
    /// the chain.
    pub fn chain_of(&self, id: &str) -> Option<(&NodeId, usize)> {
        let parent_id = self.node(id)?.parent_id.as_deref()?;
        let parent = self.node(parent_id)?;
        let idx = parent.chain()?.iter().position(|m| m == id)?;
        Some((&parent.id, idx))
    }

    /// True if `id` is an inactive chain member of a collapsed group. Such
    /// members are neither rendered nor re-placed by layout.
    pub fn suppressed_member(&self, id: &str) -> bool {
        let Some(parent) = self
            .node(id)
            .and_then(|n| n.parent_id.as_deref())
            .and_then(|p| self.node(p))
        else {
            return false;
        };
        parent.render_as_group() && parent.active_step().map(|s| s.as_str() != id).unwrap_or(true)
    }

    /// Resolve a node's absolute position, walking the parent chain for
    /// group members.
    pub fn resolved_position(&self, id: &str) -> Option<Point2D<f32>> {
        let mut pos = Point2D::zero();
        let mut cur = id;
        // Bounded by the node count; malformed parent loops bail out.
        for _ in 0..=self.node_map.len() {
            let node = self.node(cur)?;
            pos += node.position.to_vector();
            match node.parent_id.as_deref() {
                Some(parent) => cur = parent,
                None => return Some(pos),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_node(id: &str, x: f32, y: f32) -> Node {
        Node::new(
            id,
            Point2D::new(x, y),
            NodePayload::Text {
                text: String::new(),
            },
        )
    }

    #[test]
    fn test_handle_roundtrip() {
        let h = handle("12", Port::Right);
        assert_eq!(h, "12-right");
        assert_eq!(parse_handle(&h), Some(("12", Port::Right)));
    }

    #[test]
    fn test_parse_handle_with_hyphenated_id() {
        assert_eq!(parse_handle("a-b-top"), Some(("a-b", Port::Top)));
    }

    #[test]
    fn test_parse_handle_rejects_unknown_port() {
        assert!(parse_handle("12-middle").is_none());
        assert!(parse_handle("nohyphen").is_none());
    }

    #[test]
    fn test_edge_port_parsing() {
        let edge = Edge::new("e1", "a", Port::Right, "b", Port::Left);
        assert_eq!(edge.source_handle, "a-right");
        assert_eq!(edge.target_handle, "b-left");
        assert_eq!(edge.source_port(), Some(Port::Right));
        assert_eq!(edge.target_port(), Some(Port::Left));
    }

    #[test]
    fn test_edge_set_source_keeps_port() {
        let mut edge = Edge::new("e1", "a", Port::Bottom, "b", Port::Top);
        edge.set_source("c");
        assert_eq!(edge.source, "c");
        assert_eq!(edge.source_handle, "c-bottom");
        assert_eq!(edge.target_handle, "b-top");
    }

    #[test]
    fn test_node_kind_predicates() {
        let code = Node::new(
            "1",
            Point2D::zero(),
            NodePayload::Code {
                text: "fn main() {}".into(),
                file_path: "src/main.rs".into(),
                pkg_path: "demo".into(),
                ranges: vec![LineRange { start: 1, end: 1 }],
            },
        );
        assert!(code.is_code());
        assert_eq!(code.kind(), NodeKind::Code);

        let group = Node::new(
            "2",
            Point2D::zero(),
            NodePayload::Scrolly {
                text: String::new(),
                chain: vec!["1".into()],
                render_as_group: false,
                step_index: 0,
            },
        );
        assert!(group.is_group());
        assert_eq!(group.active_step(), Some(&"1".to_string()));
    }

    #[test]
    fn test_note_incoming_outgoing() {
        let mut note = Note::new("n", "t", "pkg");
        note.node_map.insert("a".into(), text_node("a", 0.0, 0.0));
        note.node_map.insert("b".into(), text_node("b", 0.0, 0.0));
        note.edges
            .push(Edge::new("e1", "a", Port::Right, "b", Port::Left));

        assert_eq!(note.outgoing("a", Port::Right).map(|e| e.id.as_str()), Some("e1"));
        assert_eq!(note.incoming("b", Port::Left).map(|e| e.id.as_str()), Some("e1"));
        assert!(note.incoming("b", Port::Top).is_none());
        assert!(note.outgoing("b", Port::Right).is_none());
    }

    #[test]
    fn test_resolved_position_walks_parents() {
        let mut note = Note::new("n", "t", "pkg");
        let mut group = Node::new(
            "g",
            Point2D::new(100.0, 50.0),
            NodePayload::Scrolly {
                text: String::new(),
                chain: vec!["m".into()],
                render_as_group: false,
                step_index: 0,
            },
        );
        group.width = Some(200.0);
        note.node_map.insert("g".into(), group);

        let mut member = text_node("m", 10.0, 20.0);
        member.parent_id = Some("g".into());
        note.node_map.insert("m".into(), member);

        assert_eq!(
            note.resolved_position("m"),
            Some(Point2D::new(110.0, 70.0))
        );
        assert_eq!(
            note.resolved_position("g"),
            Some(Point2D::new(100.0, 50.0))
        );
    }

    #[test]
    fn test_resolved_position_bails_on_parent_loop() {
        let mut note = Note::new("n", "t", "pkg");
        let mut a = text_node("a", 0.0, 0.0);
        a.parent_id = Some("b".into());
        let mut b = text_node("b", 0.0, 0.0);
        b.parent_id = Some("a".into());
        note.node_map.insert("a".into(), a);
        note.node_map.insert("b".into(), b);
        assert!(note.resolved_position("a").is_none());
    }

    #[test]
    fn test_note_json_shape() {
        let mut note = Note::new("1", "Untitled", "demo");
        note.node_map.insert("2".into(), text_node("2", 5.0, 6.0));
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(json["version"], 2);
        assert_eq!(json["nodeMap"]["2"]["type"], "Text");
        assert_eq!(json["nodeMap"]["2"]["position"]["x"], 5.0);
    }
}

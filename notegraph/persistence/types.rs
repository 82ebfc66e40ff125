/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Persisted document shape and version migration.
//!
//! A note is stored as one JSON file carrying the `Note` shape plus an
//! integer `version`. Migration runs on the raw JSON value before typed
//! deserialization, so old documents load without a parallel set of legacy
//! structs.

use log::info;
use serde_json::Value;

use crate::graph::{NOTE_VERSION, Note};

/// Rewrite an older document value into the current shape.
///
/// Version 1 used `blockMap` and `activeBlockId`; a document with no
/// `version` field at all is treated as version 1.
pub fn migrate(mut value: Value) -> Value {
    let version = value
        .get("version")
        .and_then(Value::as_u64)
        .unwrap_or(1) as u32;
    if version >= NOTE_VERSION {
        return value;
    }

    if let Some(obj) = value.as_object_mut() {
        info!("Migrating note document from version {version} to {NOTE_VERSION}");
        if let Some(nodes) = obj.remove("blockMap") {
            obj.insert("nodeMap".to_string(), nodes);
        }
        if let Some(active) = obj.remove("activeBlockId") {
            obj.insert("activeNodeId".to_string(), active);
        }
        obj.insert("version".to_string(), Value::from(NOTE_VERSION));
    }
    value
}

/// Deserialize a note from its stored JSON text, migrating old shapes.
pub fn note_from_json(text: &str) -> serde_json::Result<Note> {
    let value: Value = serde_json::from_str(text)?;
    serde_json::from_value(migrate(value))
}

/// Serialize a note for storage.
pub fn note_to_json(note: &Note) -> serde_json::Result<String> {
    serde_json::to_string_pretty(note)
}

/// The numerically largest id used anywhere in a note, for seeding the
/// host's id counter above every existing id.
pub fn max_numeric_id(note: &Note) -> u64 {
    let node_ids = note.node_map.keys();
    let edge_ids = note.edges.iter().map(|e| &e.id);
    node_ids
        .chain(edge_ids)
        .filter_map(|id| id.parse::<u64>().ok())
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node, NodePayload, Port};
    use euclid::default::Point2D;
    use serde_json::json;

    #[test]
    fn test_migrate_v1_field_names() {
        let v1 = json!({
            "id": "1",
            "title": "Old",
            "pkgPath": "pkg",
            "blockMap": {
                "2": { "id": "2", "position": { "x": 0.0, "y": 0.0 }, "type": "Text", "text": "hi" }
            },
            "edges": [],
            "activeBlockId": "2"
        });

        let note: Note = serde_json::from_value(migrate(v1)).unwrap();
        assert_eq!(note.version, NOTE_VERSION);
        assert_eq!(note.active_node_id.as_deref(), Some("2"));
        assert_eq!(note.node("2").and_then(|n| n.text()), Some("hi"));
    }

    #[test]
    fn test_migrate_leaves_current_version_alone() {
        let v2 = json!({
            "id": "1",
            "title": "New",
            "pkgPath": "pkg",
            "nodeMap": {},
            "edges": [],
            "version": 2
        });
        assert_eq!(migrate(v2.clone()), v2);
    }

    #[test]
    fn test_json_round_trip() {
        let mut note = Note::new("1", "T", "pkg");
        note.node_map.insert(
            "2".into(),
            Node::new(
                "2",
                Point2D::new(1.0, 2.0),
                NodePayload::Text {
                    text: "x".into(),
                },
            ),
        );
        note.edges
            .push(Edge::new("3", "2", Port::Right, "2", Port::Left));

        let text = note_to_json(&note).unwrap();
        let back = note_from_json(&text).unwrap();
        assert_eq!(back, note);
    }

    #[test]
    fn test_max_numeric_id_scans_nodes_and_edges() {
        let mut note = Note::new("1", "T", "pkg");
        note.node_map.insert(
            "5".into(),
            Node::new(
                "5",
                Point2D::zero(),
                NodePayload::Text {
                    text: String::new(),
                },
            ),
        );
        note.edges
            .push(Edge::new("12", "5", Port::Right, "5", Port::Left));
        assert_eq!(max_numeric_id(&note), 12);
    }
}

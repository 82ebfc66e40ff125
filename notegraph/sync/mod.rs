/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Host/panel synchronization protocol.
//!
//! A duplex channel multiplexed by a string `action` discriminant and a
//! `data` payload. Host-to-panel actions carry the `ext2web-` prefix,
//! panel-to-host actions `web2ext-`. `HostEndpoint` is the document-owning
//! side: it answers the panel handshake, mints ids, debounces persisted
//! writes, and buffers text changes while the panel is hidden.
//!
//! Protocol anomalies (unknown nodes, unparsable document names, malformed
//! save payloads) are logged no-ops; only semantic precondition failures of
//! user actions surface as `show-warn`/`show-error` notifications.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::graph::{LineRange, NodeId, Note};
use crate::persistence::{NoteStorage, StorageError, types};
use crate::sync::cache::TextChangeCache;
use crate::sync::debounce::Debouncer;
use crate::sync::ids::{IdRequest, IdResponse, IdSource, LocalIdSource};
use crate::sync::vdoc::{VdocKind, parse_vdoc_name, vdoc_name};

pub mod cache;
pub mod debounce;
pub mod ids;
pub mod vdoc;

/// Delay before the host writes a saved document to storage.
pub const HOST_SAVE_DELAY: Duration = Duration::from_millis(500);

/// In-place text update for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChangePayload {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    pub text: String,
}

/// New-block request payload; the id is filled in once allocated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub text: String,
}

/// Long-form text editor session payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEditPayload {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Code-range editor session payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRangePayload {
    pub id: NodeId,
    pub file_path: String,
    pub pkg_path: String,
    pub ranges: Vec<LineRange>,
}

/// Live snippet update while a code-range session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRangeChangePayload {
    pub id: NodeId,
    pub code: String,
    pub row_count: u32,
    pub ranges: Vec<LineRange>,
}

/// Key/value store access payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvPayload {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<String>,
}

/// Host-to-panel messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum HostMessage {
    #[serde(rename = "ext2web-init-tree-note")]
    InitTreeNote(Note),
    #[serde(rename = "ext2web-text-change")]
    TextChange(TextChangePayload),
    #[serde(rename = "ext2web-add-detail")]
    AddDetail(BlockPayload),
    #[serde(rename = "ext2web-add-next")]
    AddNext(BlockPayload),
    #[serde(rename = "ext2web-response-for-ids")]
    ResponseForIds(IdResponse),
    #[serde(rename = "ext2web-text-edit-ready")]
    TextEditReady(TextEditPayload),
    #[serde(rename = "ext2web-text-edit-done")]
    TextEditDone(TextEditPayload),
    #[serde(rename = "ext2web-code-range-edit-ready")]
    CodeRangeEditReady(CodeRangePayload),
    #[serde(rename = "ext2web-code-range-edit-stopped")]
    CodeRangeEditStopped(CodeRangePayload),
    #[serde(rename = "ext2web-code-range-change")]
    CodeRangeChange(CodeRangeChangePayload),
    #[serde(rename = "ext2web-get-kv")]
    GetKv(KvPayload),
    #[serde(rename = "ext2web-set-kv")]
    SetKv(KvPayload),
}

/// Panel-to-host messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum PanelMessage {
    #[serde(rename = "web2ext-ask-init-tree-note")]
    AskInitTreeNote,
    #[serde(rename = "web2ext-add-detail")]
    AddDetail(BlockPayload),
    #[serde(rename = "web2ext-add-next")]
    AddNext(BlockPayload),
    #[serde(rename = "web2ext-request-for-ids")]
    RequestForIds(IdRequest),
    #[serde(rename = "web2ext-save-note")]
    SaveNote(String),
    #[serde(rename = "web2ext-text-edit-start")]
    TextEditStart(TextEditPayload),
    #[serde(rename = "web2ext-text-edit-done")]
    TextEditDone(TextEditPayload),
    #[serde(rename = "web2ext-code-range-edit-start")]
    CodeRangeEditStart(CodeRangePayload),
    #[serde(rename = "web2ext-code-range-edit-stopped")]
    CodeRangeEditStopped(CodeRangePayload),
    #[serde(rename = "web2ext-show-info")]
    ShowInfo(String),
    #[serde(rename = "web2ext-show-warn")]
    ShowWarn(String),
    #[serde(rename = "web2ext-show-error")]
    ShowError(String),
    #[serde(rename = "web2ext-get-kv")]
    GetKv(KvPayload),
    #[serde(rename = "web2ext-set-kv")]
    SetKv(KvPayload),
}

/// The document-owning side of the channel.
///
/// Runs as a single logical event loop: `handle` processes one panel
/// message per turn and returns the replies to send; `tick` flushes
/// debounced writes whose deadline has passed.
pub struct HostEndpoint {
    storage: Box<dyn NoteStorage>,
    note_id: String,
    pkg_path: String,
    note: Option<Note>,
    ids: LocalIdSource,
    kv: HashMap<String, String>,
    saves: Debouncer<String, Note>,
    text_cache: TextChangeCache,
    panel_visible: bool,
    open_docs: HashSet<String>,
}

impl HostEndpoint {
    pub fn new(storage: Box<dyn NoteStorage>, note_id: impl Into<String>, pkg_path: impl Into<String>) -> Self {
        Self {
            storage,
            note_id: note_id.into(),
            pkg_path: pkg_path.into(),
            note: None,
            ids: LocalIdSource::default(),
            kv: HashMap::new(),
            saves: Debouncer::new(HOST_SAVE_DELAY),
            text_cache: TextChangeCache::default(),
            panel_visible: false,
            open_docs: HashSet::new(),
        }
    }

    pub fn note(&self) -> Option<&Note> {
        self.note.as_ref()
    }

    /// Process one panel message, returning the replies to deliver.
    pub fn handle(&mut self, msg: PanelMessage, now: Instant) -> Vec<HostMessage> {
        match msg {
            PanelMessage::AskInitTreeNote => self.handshake(),
            PanelMessage::RequestForIds(req) => match self.ids.alloc(req.n) {
                Ok(ids) => vec![HostMessage::ResponseForIds(IdResponse {
                    key: req.key,
                    ids,
                })],
                Err(e) => {
                    warn!("Id allocation failed: {e}");
                    Vec::new()
                },
            },
            PanelMessage::SaveNote(text) => {
                match types::note_from_json(&text) {
                    Ok(note) => {
                        self.note = Some(note.clone());
                        self.saves.schedule(note.id.clone(), note, now);
                    },
                    Err(e) => warn!("Ignoring malformed save-note payload: {e}"),
                }
                Vec::new()
            },
            PanelMessage::TextEditStart(p) => {
                self.open_docs
                    .insert(vdoc_name(VdocKind::Text, &p.node_type, &p.id));
                vec![HostMessage::TextEditReady(p)]
            },
            PanelMessage::TextEditDone(p) => {
                self.open_docs
                    .remove(&vdoc_name(VdocKind::Text, &p.node_type, &p.id));
                Vec::new()
            },
            PanelMessage::CodeRangeEditStart(p) => {
                self.open_docs
                    .insert(vdoc_name(VdocKind::CodeRange, "code", &p.id));
                vec![HostMessage::CodeRangeEditReady(p)]
            },
            PanelMessage::CodeRangeEditStopped(p) => {
                self.open_docs
                    .remove(&vdoc_name(VdocKind::CodeRange, "code", &p.id));
                Vec::new()
            },
            PanelMessage::AddDetail(p) | PanelMessage::AddNext(p) => {
                debug!("Panel acknowledged block insertion for {:?}", p.id);
                Vec::new()
            },
            PanelMessage::ShowInfo(msg) => {
                info!("{msg}");
                Vec::new()
            },
            PanelMessage::ShowWarn(msg) => {
                warn!("{msg}");
                Vec::new()
            },
            PanelMessage::ShowError(msg) => {
                error!("{msg}");
                Vec::new()
            },
            PanelMessage::GetKv(p) => {
                let val = self.kv.get(&p.key).cloned();
                vec![HostMessage::GetKv(KvPayload { key: p.key, val })]
            },
            PanelMessage::SetKv(p) => {
                match p.val {
                    Some(val) => {
                        self.kv.insert(p.key, val);
                    },
                    None => {
                        self.kv.remove(&p.key);
                    },
                }
                Vec::new()
            },
        }
    }

    /// Answer `ask-init-tree-note`: load or create the document, then flush
    /// any text changes buffered while the panel was hidden.
    fn handshake(&mut self) -> Vec<HostMessage> {
        self.panel_visible = true;
        let note = match self.current_note() {
            Ok(note) => note,
            Err(e) => {
                error!("Failed to load note {}: {e}", self.note_id);
                return Vec::new();
            },
        };

        let mut out = vec![HostMessage::InitTreeNote(note)];
        out.extend(self.text_cache.take_all().into_iter().map(HostMessage::TextChange));
        out
    }

    fn current_note(&mut self) -> Result<Note, StorageError> {
        if let Some(note) = &self.note {
            return Ok(note.clone());
        }
        let note = match self.storage.load(&self.note_id)? {
            Some(note) => note,
            None => Note::new(&self.note_id, "Untitled", &self.pkg_path),
        };
        // The id counter must stay ahead of every id already in use.
        self.ids = LocalIdSource::starting_at(types::max_numeric_id(&note) + 1);
        self.note = Some(note.clone());
        Ok(note)
    }

    /// A virtual text document's buffer changed on the host side, addressed
    /// by its document name. A name that fails the strict parse came from
    /// outside the protocol and is a logged no-op.
    pub fn vdoc_text_changed(&mut self, doc_name: &str, text: String) -> Option<HostMessage> {
        let Some((node_type, id)) = parse_vdoc_name(VdocKind::Text, doc_name) else {
            warn!("Ignoring change for unrecognized virtual document {doc_name:?}");
            return None;
        };
        let change = TextChangePayload {
            id: id.to_string(),
            node_type: node_type.to_string(),
            text,
        };
        self.text_changed(change)
    }

    /// A virtual editor buffer changed on the host side. Delivered at once
    /// while the panel is visible, otherwise buffered latest-wins.
    pub fn text_changed(&mut self, change: TextChangePayload) -> Option<HostMessage> {
        if self.panel_visible {
            return Some(HostMessage::TextChange(change));
        }
        let doc = vdoc_name(VdocKind::Text, &change.node_type, &change.id);
        self.text_cache.put(doc, change);
        None
    }

    /// Panel visibility toggled; becoming visible flushes buffered changes.
    pub fn set_panel_visible(&mut self, visible: bool) -> Vec<HostMessage> {
        self.panel_visible = visible;
        if !visible {
            return Vec::new();
        }
        self.text_cache
            .take_all()
            .into_iter()
            .map(HostMessage::TextChange)
            .collect()
    }

    /// Flush debounced document writes whose deadline has passed.
    pub fn tick(&mut self, now: Instant) {
        for (id, note) in self.saves.due(now) {
            if let Err(e) = self.storage.save(&note) {
                // Working copy stays authoritative; a failed write is not
                // fatal.
                warn!("Failed to persist note {id}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{FsNoteStorage, MemoryNoteStorage};
    use serde_json::json;
    use tempfile::TempDir;

    fn endpoint() -> HostEndpoint {
        HostEndpoint::new(Box::new(MemoryNoteStorage::default()), "1", "pkg")
    }

    #[test]
    fn test_panel_message_wire_shape() {
        let msg = PanelMessage::AskInitTreeNote;
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "action": "web2ext-ask-init-tree-note" })
        );

        let msg = PanelMessage::RequestForIds(IdRequest { key: 3, n: 2 });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "action": "web2ext-request-for-ids",
                "data": { "key": 3, "n": 2 }
            })
        );
    }

    #[test]
    fn test_host_message_wire_shape() {
        let msg = HostMessage::TextChange(TextChangePayload {
            id: "5".into(),
            node_type: "text".into(),
            text: "hello".into(),
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "action": "ext2web-text-change",
                "data": { "id": "5", "type": "text", "text": "hello" }
            })
        );
    }

    #[test]
    fn test_message_round_trip() {
        let msg = PanelMessage::ShowWarn("careful".into());
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(serde_json::from_str::<PanelMessage>(&text).unwrap(), msg);
    }

    #[test]
    fn test_handshake_creates_untitled_note() {
        let mut host = endpoint();
        let replies = host.handle(PanelMessage::AskInitTreeNote, Instant::now());
        match &replies[..] {
            [HostMessage::InitTreeNote(note)] => {
                assert_eq!(note.title, "Untitled");
                assert!(note.node_map.is_empty());
            },
            other => panic!("unexpected replies: {other:?}"),
        }
    }

    #[test]
    fn test_id_requests_are_answered_monotonically() {
        let mut host = endpoint();
        host.handle(PanelMessage::AskInitTreeNote, Instant::now());

        let first = host.handle(
            PanelMessage::RequestForIds(IdRequest { key: 0, n: 2 }),
            Instant::now(),
        );
        let second = host.handle(
            PanelMessage::RequestForIds(IdRequest { key: 1, n: 1 }),
            Instant::now(),
        );
        let (a, b) = match (&first[..], &second[..]) {
            (
                [HostMessage::ResponseForIds(a)],
                [HostMessage::ResponseForIds(b)],
            ) => (a.clone(), b.clone()),
            other => panic!("unexpected replies: {other:?}"),
        };
        assert_eq!(a.key, 0);
        assert_eq!(b.key, 1);
        assert_eq!(a.ids.len(), 2);
        assert!(b.ids[0].parse::<u64>().unwrap() > a.ids[1].parse::<u64>().unwrap());
    }

    #[test]
    fn test_save_note_is_debounced() {
        let dir = TempDir::new().unwrap();
        let mut host = HostEndpoint::new(
            Box::new(FsNoteStorage::new(dir.path())),
            "1",
            "pkg",
        );
        let t0 = Instant::now();
        let note = Note::new("1", "Saved", "pkg");
        let text = types::note_to_json(&note).unwrap();

        host.handle(PanelMessage::SaveNote(text), t0);
        host.tick(t0 + Duration::from_millis(100));
        assert!(!dir.path().join("1.json").exists());

        host.tick(t0 + Duration::from_millis(600));
        assert!(dir.path().join("1.json").exists());
    }

    #[test]
    fn test_malformed_save_note_is_ignored() {
        let mut host = endpoint();
        host.handle(PanelMessage::SaveNote("not json".into()), Instant::now());
        assert!(host.note().is_none());
    }

    #[test]
    fn test_kv_round_trip() {
        let mut host = endpoint();
        host.handle(
            PanelMessage::SetKv(KvPayload {
                key: "theme".into(),
                val: Some("dark".into()),
            }),
            Instant::now(),
        );
        let replies = host.handle(
            PanelMessage::GetKv(KvPayload {
                key: "theme".into(),
                val: None,
            }),
            Instant::now(),
        );
        assert_eq!(
            replies,
            vec![HostMessage::GetKv(KvPayload {
                key: "theme".into(),
                val: Some("dark".into()),
            })]
        );
    }

    #[test]
    fn test_text_changes_buffer_while_panel_hidden() {
        let mut host = endpoint();
        let change = |text: &str| TextChangePayload {
            id: "5".into(),
            node_type: "text".into(),
            text: text.into(),
        };

        assert!(host.text_changed(change("first")).is_none());
        assert!(host.text_changed(change("second")).is_none());

        let flushed = host.set_panel_visible(true);
        assert_eq!(
            flushed,
            vec![HostMessage::TextChange(change("second"))]
        );
        // Visible now: changes deliver immediately.
        assert!(host.text_changed(change("third")).is_some());
    }

    #[test]
    fn test_handshake_flushes_buffered_changes_after_init() {
        let mut host = endpoint();
        host.text_changed(TextChangePayload {
            id: "5".into(),
            node_type: "text".into(),
            text: "buffered".into(),
        });

        let replies = host.handle(PanelMessage::AskInitTreeNote, Instant::now());
        assert_eq!(replies.len(), 2);
        assert!(matches!(replies[0], HostMessage::InitTreeNote(_)));
        assert!(matches!(replies[1], HostMessage::TextChange(_)));
    }

    #[test]
    fn test_vdoc_change_parses_document_name() {
        let mut host = endpoint();
        host.set_panel_visible(true);

        let msg = host.vdoc_text_changed("text-5.mdx", "body".into());
        match msg {
            Some(HostMessage::TextChange(p)) => {
                assert_eq!(p.id, "5");
                assert_eq!(p.node_type, "text");
                assert_eq!(p.text, "body");
            },
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_vdoc_change_buffers_while_hidden() {
        let mut host = endpoint();
        assert!(host.vdoc_text_changed("text-5.mdx", "draft".into()).is_none());

        let flushed = host.set_panel_visible(true);
        assert_eq!(flushed.len(), 1);
        assert!(matches!(&flushed[0], HostMessage::TextChange(p) if p.text == "draft"));
    }

    #[test]
    fn test_vdoc_change_with_bad_name_is_noop() {
        let mut host = endpoint();
        assert!(host.vdoc_text_changed("garbage", "x".into()).is_none());
        assert!(host.vdoc_text_changed("text-5.code", "x".into()).is_none());
        // Nothing was buffered for the next handshake either.
        assert!(host.set_panel_visible(true).is_empty());
    }

    #[test]
    fn test_text_edit_session_handshake() {
        let mut host = endpoint();
        let payload = TextEditPayload {
            id: "5".into(),
            node_type: "text".into(),
            text: Some("body".into()),
        };
        let replies = host.handle(PanelMessage::TextEditStart(payload.clone()), Instant::now());
        assert_eq!(replies, vec![HostMessage::TextEditReady(payload.clone())]);
        assert!(host.open_docs.contains("text-5.mdx"));

        host.handle(PanelMessage::TextEditDone(payload), Instant::now());
        assert!(host.open_docs.is_empty());
    }
}

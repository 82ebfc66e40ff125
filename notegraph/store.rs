/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Panel-side note store.
//!
//! Owns the working copy of the document, the selection, and the derived
//! layout/visibility state. Every structural edit runs synchronously within
//! one turn: mutate, relayout, refresh visibility, queue a debounced save.
//! Outbound messages accumulate in an outbox the transport drains; UI
//! subscribers observe `StoreEvent`s over a crossbeam channel.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{debug, warn};

use crate::graph::layout::{LayoutSettings, layout};
use crate::graph::ops::{self, Direction, OpError};
use crate::graph::visibility::{HiddenSets, hidden_sets};
use crate::graph::{NodeId, NodePayload, Note, Port};
use crate::persistence::types;
use crate::sync::ids::IdSource;
use crate::sync::{BlockPayload, HostMessage, PanelMessage};

/// Delay before an edited document is sent to the host for persistence.
pub const PANEL_SAVE_DELAY: Duration = Duration::from_millis(800);

/// Notifications for UI subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The whole working copy was replaced by the host.
    NoteReplaced,
    /// Layout ran; the listed nodes moved or resized.
    LayoutChanged(Vec<NodeId>),
    /// The hidden node/edge sets were recomputed.
    VisibilityChanged,
    /// One node's text was updated in place.
    TextChanged(NodeId),
}

pub struct NoteStore {
    note: Option<Note>,
    settings: LayoutSettings,
    ids: Box<dyn IdSource>,
    selection: Vec<NodeId>,
    /// Always-visible allowlist, e.g. a transient template node during a
    /// connection drag. Independent of the selection.
    keep_visible: Vec<NodeId>,
    hidden: HiddenSets,
    saves: crate::sync::debounce::Debouncer<String, ()>,
    outbox: Vec<PanelMessage>,
    events_tx: Sender<StoreEvent>,
    events_rx: Receiver<StoreEvent>,
}

impl NoteStore {
    pub fn new(settings: LayoutSettings, ids: Box<dyn IdSource>) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            note: None,
            settings,
            ids,
            selection: Vec::new(),
            keep_visible: Vec::new(),
            hidden: HiddenSets::default(),
            saves: crate::sync::debounce::Debouncer::new(PANEL_SAVE_DELAY),
            outbox: Vec::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn note(&self) -> Option<&Note> {
        self.note.as_ref()
    }

    pub fn hidden(&self) -> &HiddenSets {
        &self.hidden
    }

    pub fn selection(&self) -> &[NodeId] {
        &self.selection
    }

    /// Subscribe to store notifications.
    pub fn events(&self) -> Receiver<StoreEvent> {
        self.events_rx.clone()
    }

    /// Drain the messages queued for the host.
    pub fn take_outbox(&mut self) -> Vec<PanelMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Process one host message within the current turn.
    pub fn apply_host_message(&mut self, msg: HostMessage, now: Instant) {
        match msg {
            HostMessage::InitTreeNote(note) => {
                let needs_layout = note.active_node_id.is_none();
                self.note = Some(note);
                self.selection.clear();
                self.emit(StoreEvent::NoteReplaced);
                if needs_layout {
                    self.relayout();
                }
                self.refresh_visibility();
            },
            HostMessage::TextChange(p) => {
                let Some(note) = self.note.as_mut() else {
                    return;
                };
                match note.node_mut(&p.id) {
                    Some(node) => {
                        node.set_text(p.text);
                        self.emit(StoreEvent::TextChanged(p.id));
                        self.schedule_save(now);
                    },
                    None => warn!("text-change for unknown node {}", p.id),
                }
            },
            HostMessage::AddDetail(p) => self.host_insert(Direction::Detail, p, now),
            HostMessage::AddNext(p) => self.host_insert(Direction::Next, p, now),
            HostMessage::ResponseForIds(r) => self.ids.deliver(r),
            HostMessage::TextEditReady(p) | HostMessage::TextEditDone(p) => {
                debug!("text edit session message for {}", p.id);
            },
            HostMessage::CodeRangeEditReady(p) | HostMessage::CodeRangeEditStopped(p) => {
                debug!("code range session message for {}", p.id);
            },
            HostMessage::CodeRangeChange(p) => {
                let Some(note) = self.note.as_mut() else {
                    return;
                };
                match note.node_mut(&p.id) {
                    Some(node) => {
                        if let NodePayload::Code { text, ranges, .. } = &mut node.payload {
                            *text = p.code;
                            *ranges = p.ranges;
                            self.emit(StoreEvent::TextChanged(p.id));
                            self.schedule_save(now);
                        } else {
                            warn!("code-range-change for non-code node {}", p.id);
                        }
                    },
                    None => warn!("code-range-change for unknown node {}", p.id),
                }
            },
            HostMessage::GetKv(p) | HostMessage::SetKv(p) => {
                debug!("kv message for key {}", p.key);
            },
        }
    }

    /// Host-initiated block insertion; the panel acknowledges with the
    /// allocated id filled in.
    fn host_insert(&mut self, direction: Direction, mut payload: BlockPayload, now: Instant) {
        let node_payload = match payload.node_type.as_str() {
            "text" => NodePayload::Text {
                text: payload.text.clone(),
            },
            "code" => NodePayload::Code {
                text: payload.text.clone(),
                file_path: String::new(),
                pkg_path: String::new(),
                ranges: Vec::new(),
            },
            other => {
                warn!("add request with unknown block type {other:?}");
                return;
            },
        };
        match self.add_node(direction, node_payload, now) {
            Ok(Some(id)) => {
                payload.id = Some(id);
                self.outbox.push(match direction {
                    Direction::Detail => PanelMessage::AddDetail(payload),
                    Direction::Next => PanelMessage::AddNext(payload),
                });
            },
            Ok(None) => {},
            Err(_) => {},
        }
    }

    pub fn set_selection(&mut self, selection: Vec<NodeId>) {
        self.selection = selection;
    }

    /// Pin nodes visible regardless of collapse state, e.g. the ghost node
    /// shown during a connection drag.
    pub fn set_keep_visible(&mut self, keep: Vec<NodeId>) {
        self.keep_visible = keep;
        self.refresh_visibility();
    }

    pub fn set_active(&mut self, id: Option<NodeId>) {
        if let Some(note) = self.note.as_mut() {
            note.active_node_id = id;
        }
    }

    pub fn add_node(
        &mut self,
        direction: Direction,
        payload: NodePayload,
        now: Instant,
    ) -> Result<Option<NodeId>, OpError> {
        let Some(note) = self.note.as_mut() else {
            return Ok(None);
        };
        let result = ops::add_node(note, direction, payload, &self.settings, self.ids.as_mut());
        self.after_mutation(&result.as_ref().map(|_| ()).map_err(Clone::clone), now);
        result
    }

    pub fn connect(
        &mut self,
        source: &str,
        source_port: Port,
        target: &str,
        target_port: Port,
        now: Instant,
    ) -> Result<(), OpError> {
        let Some(note) = self.note.as_mut() else {
            return Ok(());
        };
        let result = ops::connect(note, source, source_port, target, target_port, self.ids.as_mut());
        self.after_mutation(&result, now);
        result
    }

    /// Group the current selection into a chain node.
    pub fn group_selection(&mut self, now: Instant) -> Result<NodeId, OpError> {
        let selection = self.selection.clone();
        let Some(note) = self.note.as_mut() else {
            return Err(OpError::SelectionNotChained);
        };
        let result = ops::group_nodes(note, &selection, self.ids.as_mut());
        self.after_mutation(&result.as_ref().map(|_| ()).map_err(Clone::clone), now);
        if let Ok(group) = &result {
            self.selection = vec![group.clone()];
        }
        result
    }

    /// Split the selected group back into its members.
    pub fn split_selection(&mut self, now: Instant) -> Result<(), OpError> {
        let selection = self.selection.clone();
        let Some(note) = self.note.as_mut() else {
            return Err(OpError::NotAGroup);
        };
        let result = ops::split_group(note, &selection);
        self.after_mutation(&result, now);
        if result.is_ok() {
            self.selection.clear();
        }
        result
    }

    pub fn delete_node(&mut self, id: &str, now: Instant) -> Result<(), OpError> {
        let Some(note) = self.note.as_mut() else {
            return Ok(());
        };
        let result = ops::delete_node(note, id, self.ids.as_mut());
        self.after_mutation(&result, now);
        result
    }

    pub fn toggle_render_as_group(&mut self, id: &str, now: Instant) -> Result<(), OpError> {
        let Some(note) = self.note.as_mut() else {
            return Ok(());
        };
        let result = ops::toggle_render_as_group(note, id).map(|_| ());
        self.after_mutation(&result, now);
        result
    }

    pub fn set_step_index(&mut self, id: &str, step: usize, now: Instant) -> Result<(), OpError> {
        let Some(note) = self.note.as_mut() else {
            return Ok(());
        };
        let result = ops::set_step_index(note, id, step);
        self.after_mutation(&result, now);
        result
    }

    /// Shared epilogue for every mutation: success relayouts, refreshes
    /// visibility, and queues a save; rejection surfaces a notification and
    /// mutates nothing further.
    fn after_mutation(&mut self, result: &Result<(), OpError>, now: Instant) {
        match result {
            Ok(()) => {
                self.relayout();
                self.refresh_visibility();
                self.schedule_save(now);
            },
            Err(e @ OpError::IdAllocation(_)) => {
                self.outbox.push(PanelMessage::ShowError(e.to_string()));
            },
            Err(e) => {
                self.outbox.push(PanelMessage::ShowWarn(e.to_string()));
            },
        }
    }

    fn relayout(&mut self) {
        let Some(note) = self.note.as_mut() else {
            return;
        };
        let result = layout(note, &self.settings);
        if result.root_ids.len() > 1 {
            warn!(
                "layout skipped: multiple roots {:?}",
                result.root_ids
            );
        }
        note.node_map = result.node_map;
        self.emit(StoreEvent::LayoutChanged(result.changed));
    }

    fn refresh_visibility(&mut self) {
        let Some(note) = self.note.as_ref() else {
            return;
        };
        self.hidden = hidden_sets(note, &self.keep_visible);
        self.emit(StoreEvent::VisibilityChanged);
    }

    fn schedule_save(&mut self, now: Instant) {
        if let Some(note) = self.note.as_ref() {
            self.saves.schedule(note.id.clone(), (), now);
        }
    }

    /// Flush due saves into the outbox as `save-note` messages.
    pub fn tick(&mut self, now: Instant) {
        for (id, ()) in self.saves.due(now) {
            let Some(note) = self.note.as_ref() else {
                continue;
            };
            match types::note_to_json(note) {
                Ok(text) => self.outbox.push(PanelMessage::SaveNote(text)),
                Err(e) => warn!("Failed to serialize note {id} for saving: {e}"),
            }
        }
    }
}

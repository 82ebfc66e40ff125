/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Note storage.
//!
//! `NoteStorage` abstracts where documents live; the in-memory working copy
//! stays authoritative and a failed write never takes the editor down. The
//! filesystem implementation keeps one JSON file per note.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::graph::Note;

pub mod types;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Io(String),
    Serde(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(msg) => write!(f, "Storage io error: {msg}"),
            StorageError::Serde(msg) => write!(f, "Storage serialization error: {msg}"),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e.to_string())
    }
}

/// Where note documents are loaded from and saved to.
pub trait NoteStorage {
    /// Load a note by id. `Ok(None)` when no such note exists.
    fn load(&self, id: &str) -> Result<Option<Note>, StorageError>;

    /// Persist a note, replacing the whole stored document.
    fn save(&mut self, note: &Note) -> Result<(), StorageError>;

    /// Delete a stored note. Removing a missing note is not an error.
    fn remove(&mut self, id: &str) -> Result<(), StorageError>;
}

/// One JSON file per note under a base directory.
pub struct FsNoteStorage {
    dir: PathBuf,
}

impl FsNoteStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn note_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl NoteStorage for FsNoteStorage {
    fn load(&self, id: &str) -> Result<Option<Note>, StorageError> {
        let text = match fs::read_to_string(self.note_path(id)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(types::note_from_json(&text)?))
    }

    fn save(&mut self, note: &Note) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let text = types::note_to_json(note)?;
        fs::write(self.note_path(&note.id), text)?;
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.note_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// HashMap-backed storage for tests and standalone runs.
#[derive(Debug, Default)]
pub struct MemoryNoteStorage {
    notes: HashMap<String, Note>,
}

impl NoteStorage for MemoryNoteStorage {
    fn load(&self, id: &str) -> Result<Option<Note>, StorageError> {
        Ok(self.notes.get(id).cloned())
    }

    fn save(&mut self, note: &Note) -> Result<(), StorageError> {
        self.notes.insert(note.id.clone(), note.clone());
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), StorageError> {
        self.notes.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Node, NodePayload};
    use euclid::default::Point2D;
    use tempfile::TempDir;

    fn sample_note(id: &str) -> Note {
        let mut note = Note::new(id, "Sample", "pkg");
        note.node_map.insert(
            "2".into(),
            Node::new(
                "2",
                Point2D::new(3.0, 4.0),
                NodePayload::Text {
                    text: "body".into(),
                },
            ),
        );
        note.active_node_id = Some("2".into());
        note
    }

    #[test]
    fn test_fs_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsNoteStorage::new(dir.path());
        let note = sample_note("1");

        storage.save(&note).unwrap();
        assert_eq!(storage.load("1").unwrap(), Some(note));
    }

    #[test]
    fn test_fs_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = FsNoteStorage::new(dir.path());
        assert_eq!(storage.load("nope").unwrap(), None);
    }

    #[test]
    fn test_fs_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut storage = FsNoteStorage::new(dir.path());
        storage.save(&sample_note("1")).unwrap();

        storage.remove("1").unwrap();
        assert_eq!(storage.load("1").unwrap(), None);
        storage.remove("1").unwrap();
    }

    #[test]
    fn test_fs_load_migrates_v1_file() {
        let dir = TempDir::new().unwrap();
        let v1 = r#"{
            "id": "1",
            "title": "Old",
            "pkgPath": "pkg",
            "blockMap": {},
            "edges": [],
            "activeBlockId": null
        }"#;
        std::fs::write(dir.path().join("1.json"), v1).unwrap();

        let storage = FsNoteStorage::new(dir.path());
        let note = storage.load("1").unwrap().unwrap();
        assert_eq!(note.version, crate::graph::NOTE_VERSION);
        assert!(note.node_map.is_empty());
    }

    #[test]
    fn test_fs_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("1.json"), "not json").unwrap();
        let storage = FsNoteStorage::new(dir.path());
        assert!(matches!(storage.load("1"), Err(StorageError::Serde(_))));
    }
}

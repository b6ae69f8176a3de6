//! Layer 5: Composite domain types
//!
//! Note: immutable free-text note appended to a room
//! NoteLog: append-only, insertion-ordered note sequence

use serde::{Deserialize, Serialize};

use super::identity::UserId;

/// Immutable note. Once appended, never changes or moves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub ts: u64,
    pub user_id: UserId,
    pub text: String,
}

impl Note {
    pub fn new(ts: u64, user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            ts,
            user_id,
            text: text.into(),
        }
    }
}

/// Notes in insertion order. No removal, no compaction, no reordering by `ts`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteLog(Vec<Note>);

impl NoteLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, note: Note) {
        self.0.push(note);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Note] {
        &self.0
    }
}

impl From<Vec<Note>> for NoteLog {
    fn from(notes: Vec<Note>) -> Self {
        Self(notes)
    }
}

impl FromIterator<Note> for NoteLog {
    fn from_iter<T: IntoIterator<Item = Note>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

//! Core identifiers and immutable session records.
//!
//! * [`ChapterId`]: opaque chapter identifier (numeric in most hosts, but
//!   never interpreted by the core).
//! * [`SessionId`]: monotonically increasing playback session counter.
//! * [`PlaybackSession`]: one chapter's paragraph list bound to a session id.
//!   Created on chapter open, wake-resume or seek; superseded, never mutated.
//! * [`PlaybackPosition`]: snapshot of the authoritative "last completed"
//!   paragraph.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// ChapterId
// ---------------------------------------------------------------------------

/// Opaque chapter identifier.
///
/// Document views usually send chapter ids as JSON numbers, some hosts send
/// strings; both deserialize into the same textual form so `1` and `"1"`
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChapterId(String);

impl ChapterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChapterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChapterId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for ChapterId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<i32> for ChapterId {
    fn from(n: i32) -> Self {
        Self(n.to_string())
    }
}

impl From<u64> for ChapterId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for ChapterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => ChapterId::from(n),
            Raw::Text(s) => ChapterId::from(s),
        })
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Monotonic playback session counter.  Only the wake coordinator issues new
/// values; everything else compares against them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// PlaybackSession
// ---------------------------------------------------------------------------

/// A chapter's paragraphs bound to one session id.
///
/// Cheap to clone: the paragraph list is shared behind an `Arc`, so a wake
/// or seek can open a new session over the same text without copying it.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    id: SessionId,
    chapter: ChapterId,
    paragraphs: Arc<[String]>,
}

impl PlaybackSession {
    pub fn new(id: SessionId, chapter: ChapterId, paragraphs: Arc<[String]>) -> Self {
        Self {
            id,
            chapter,
            paragraphs,
        }
    }

    /// Supersede this session with a new id over the same chapter text.
    pub fn supersede(&self, id: SessionId) -> Self {
        Self {
            id,
            chapter: self.chapter.clone(),
            paragraphs: Arc::clone(&self.paragraphs),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn chapter(&self) -> &ChapterId {
        &self.chapter
    }

    pub fn paragraphs(&self) -> &[String] {
        &self.paragraphs
    }

    pub fn total_count(&self) -> usize {
        self.paragraphs.len()
    }
}

// ---------------------------------------------------------------------------
// PlaybackPosition
// ---------------------------------------------------------------------------

/// Read-only snapshot of the tracker's position.
///
/// `last_completed == None` means nothing has finished yet, which is a valid
/// state distinct from "paragraph 0 completed".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlaybackPosition {
    pub last_completed: Option<usize>,
    pub is_speaking: bool,
}

impl PlaybackPosition {
    /// The `-1`-based convention used by hosts and logs.
    ///
    /// ```
    /// use tts_sync::session::PlaybackPosition;
    ///
    /// assert_eq!(PlaybackPosition::default().last_completed_index(), -1);
    /// let pos = PlaybackPosition { last_completed: Some(4), is_speaking: true };
    /// assert_eq!(pos.last_completed_index(), 4);
    /// ```
    pub fn last_completed_index(&self) -> i64 {
        self.last_completed.map_or(-1, |n| n as i64)
    }

    /// Index of the paragraph that should be highlighted / played next.
    pub fn next_index(&self) -> usize {
        self.last_completed.map_or(0, |n| n + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_id_accepts_number_and_string() {
        let a: ChapterId = serde_json::from_str("12").unwrap();
        let b: ChapterId = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "12");
    }

    #[test]
    fn session_ids_increase() {
        let s = SessionId::default();
        assert!(s.next() > s);
        assert_eq!(s.next().next(), SessionId(2));
    }

    #[test]
    fn supersede_keeps_text_and_changes_id() {
        let paragraphs: Arc<[String]> = vec!["a".to_string(), "b".to_string()].into();
        let first = PlaybackSession::new(SessionId(1), ChapterId::from(7), paragraphs);
        let second = first.supersede(SessionId(2));

        assert_eq!(second.id(), SessionId(2));
        assert_eq!(second.chapter(), first.chapter());
        assert_eq!(second.total_count(), 2);
        assert_eq!(first.id(), SessionId(1));
    }

    #[test]
    fn next_index_follows_last_completed() {
        assert_eq!(PlaybackPosition::default().next_index(), 0);
        let pos = PlaybackPosition {
            last_completed: Some(9),
            is_speaking: false,
        };
        assert_eq!(pos.next_index(), 10);
    }
}

//! Inbound document-view messages.
//!
//! The view posts JSON strings such as
//!
//! ```json
//! {"type":"save","chapterId":12,"paragraphIndex":40,"timestamp":1718000000000}
//! {"type":"tts-queue","chapterId":"12","startIndex":41,"timestamp":1718000000450}
//! ```
//!
//! `chapterId` may be a number, a string, `null` or absent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::position::PositionReport;
use crate::session::ChapterId;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed view message: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ViewMessage {
    /// The view asks playback to continue from `start_index`.
    #[serde(rename_all = "camelCase")]
    TtsQueue {
        #[serde(default)]
        chapter_id: Option<ChapterId>,
        start_index: i64,
        #[serde(default)]
        timestamp: Option<u64>,
    },
    /// The view reports the paragraph the reader is on.
    #[serde(rename_all = "camelCase")]
    Save {
        #[serde(default)]
        chapter_id: Option<ChapterId>,
        paragraph_index: i64,
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

impl ViewMessage {
    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TtsQueue { .. } => "tts-queue",
            Self::Save { .. } => "save",
        }
    }

    /// The position claim carried by the message.  Negative indices are not
    /// positions and yield `None`.
    pub fn report(&self) -> Option<PositionReport> {
        let (chapter, index, timestamp) = match self {
            Self::TtsQueue {
                chapter_id,
                start_index,
                timestamp,
            } => (chapter_id, *start_index, *timestamp),
            Self::Save {
                chapter_id,
                paragraph_index,
                timestamp,
            } => (chapter_id, *paragraph_index, *timestamp),
        };
        let index = usize::try_from(index).ok()?;
        Some(PositionReport {
            chapter: chapter.clone(),
            index,
            timestamp,
        })
    }
}

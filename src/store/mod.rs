//! Reading-progress persistence.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 ProgressStore (trait)                        │
//! │                                                              │
//! │  read_last_index(chapter)                  → Option<usize>   │
//! │  write_last_index(chapter, index, complete)                  │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │                               │
//!       ┌────────▼────────┐             ┌────────▼─────────┐
//!       │  JsonFileStore  │             │   MemoryStore    │
//!       │  (durable)      │             │   (fast cache)   │
//!       └─────────────────┘             └──────────────────┘
//! ```
//!
//! The core keeps two stores: a durable one and a fast cache that may run
//! ahead of it.  Writes are awaited in issue order but their failures never
//! stop playback; callers log and move on.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::ChapterId;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("progress store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress store is corrupt: {0}")]
    Serde(#[from] serde_json::Error),

    /// Injected by test doubles.
    #[error("progress store unavailable")]
    Unavailable,
}

// ---------------------------------------------------------------------------
// ProgressRecord
// ---------------------------------------------------------------------------

/// What is persisted per chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub last_index: usize,
    pub is_complete: bool,
}

// ---------------------------------------------------------------------------
// ProgressStore trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Last persisted paragraph for `chapter`, `None` if never saved.
    async fn read_last_index(&self, chapter: &ChapterId) -> Result<Option<usize>, StoreError>;

    async fn write_last_index(
        &self,
        chapter: &ChapterId,
        index: usize,
        is_complete: bool,
    ) -> Result<(), StoreError>;
}

// Compile-time assertion: Box<dyn ProgressStore> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn ProgressStore>) {}
};

/// Read without failing: errors are logged and read as "never saved".
pub async fn read_or_none(store: &dyn ProgressStore, label: &str, chapter: &ChapterId) -> Option<usize> {
    match store.read_last_index(chapter).await {
        Ok(index) => index,
        Err(e) => {
            log::warn!("store: {label} read for chapter {chapter} failed: {e}");
            None
        }
    }
}

/// Write without failing: errors are logged and swallowed.
pub async fn write_logged(
    store: &dyn ProgressStore,
    label: &str,
    chapter: &ChapterId,
    index: usize,
    is_complete: bool,
) {
    if let Err(e) = store.write_last_index(chapter, index, is_complete).await {
        log::warn!("store: {label} write of {index} for chapter {chapter} failed: {e}");
    }
}

//! Chapter transition handshake.
//!
//! Finishing a chapter flushes "100 % complete" to both stores before the
//! next chapter is opened; opening a chapter either starts cleanly from its
//! persisted position or, when the engine is already mid-way through that
//! same chapter at a different position, hands the decision back to the
//! caller as a [`ChapterConflict`].

use std::sync::Arc;

use crate::position::PositionTracker;
use crate::session::ChapterId;
use crate::store::{self, ProgressStore};

use super::wake::resolve_index;

/// What the engine is currently playing, if anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlight {
    pub chapter: ChapterId,
    pub last_completed: Option<usize>,
}

/// Two incompatible positions for the same chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterConflict {
    pub chapter: ChapterId,
    /// Position of the in-flight playback.
    pub current: Option<usize>,
    /// Position persisted for the requested chapter.
    pub requested: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    KeepCurrent,
    UseRequested,
}

impl ChapterConflict {
    pub fn resolve(&self, resolution: Resolution) -> Option<usize> {
        match resolution {
            Resolution::KeepCurrent => self.current,
            Resolution::UseRequested => self.requested,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterOpen {
    Started { last_completed: Option<usize> },
    Conflict(ChapterConflict),
}

pub struct ChapterTransitionHandler {
    durable: Arc<dyn ProgressStore>,
    cache: Arc<dyn ProgressStore>,
    pending: Option<ChapterConflict>,
}

impl ChapterTransitionHandler {
    pub fn new(durable: Arc<dyn ProgressStore>, cache: Arc<dyn ProgressStore>) -> Self {
        Self {
            durable,
            cache,
            pending: None,
        }
    }

    /// Force-flush `total - 1` as complete to the durable store, then the
    /// cache.  Returns the flushed index.
    pub async fn finish_chapter(&self, chapter: &ChapterId, total: usize) -> Option<usize> {
        let last = total.checked_sub(1)?;
        log::info!("chapter: {chapter} finished, flushing {last} as complete");
        store::write_logged(self.durable.as_ref(), "durable", chapter, last, true).await;
        store::write_logged(self.cache.as_ref(), "cache", chapter, last, true).await;
        Some(last)
    }

    /// Open `requested`.  On [`ChapterOpen::Started`] the tracker has been
    /// reset to the chapter's persisted position; on a conflict nothing has
    /// changed and the conflict is held until [`Self::resolve_pending`].
    pub async fn open_chapter(
        &mut self,
        requested: &ChapterId,
        in_flight: Option<InFlight>,
        tracker: &mut PositionTracker,
    ) -> ChapterOpen {
        let persisted = self.persisted(requested).await;

        if let Some(flight) = in_flight {
            if flight.chapter == *requested && flight.last_completed != persisted {
                let conflict = ChapterConflict {
                    chapter: requested.clone(),
                    current: flight.last_completed,
                    requested: persisted,
                };
                log::warn!(
                    "chapter: conflict on {requested}: playing at {:?}, persisted {:?}",
                    conflict.current,
                    conflict.requested
                );
                self.pending = Some(conflict.clone());
                return ChapterOpen::Conflict(conflict);
            }
        }

        self.pending = None;
        tracker.reset(requested.clone(), persisted);
        ChapterOpen::Started {
            last_completed: persisted,
        }
    }

    /// Apply the caller's answer to the held conflict.  Returns the chapter
    /// and the chosen position, or `None` when no conflict was pending.
    pub async fn resolve_pending(
        &mut self,
        resolution: Resolution,
        tracker: &mut PositionTracker,
    ) -> Option<(ChapterId, Option<usize>)> {
        let conflict = self.pending.take()?;
        let index = conflict.resolve(resolution);
        log::info!(
            "chapter: conflict on {} resolved with {resolution:?} → {index:?}",
            conflict.chapter
        );
        tracker.reset(conflict.chapter.clone(), index);
        if let Some(i) = index {
            store::write_logged(self.durable.as_ref(), "durable", &conflict.chapter, i, false).await;
            store::write_logged(self.cache.as_ref(), "cache", &conflict.chapter, i, false).await;
        }
        Some((conflict.chapter, index))
    }

    pub fn pending(&self) -> Option<&ChapterConflict> {
        self.pending.as_ref()
    }

    /// Persisted position: the furthest of the durable store and the cache.
    pub async fn persisted(&self, chapter: &ChapterId) -> Option<usize> {
        let durable = store::read_or_none(self.durable.as_ref(), "durable", chapter).await;
        let cache = store::read_or_none(self.cache.as_ref(), "cache", chapter).await;
        resolve_index(durable, cache, None)
    }
}

//! Paragraph position tracker: sole writer of the "last completed paragraph".
//!
//! Completion events from the engine are authoritative and only ever move
//! the index forward within a session.  Start events mark what is being
//! spoken but never touch the completed index, so a paragraph that is
//! interrupted mid-utterance is replayed rather than skipped.

use crate::session::{ChapterId, PlaybackPosition, SessionId, UtteranceId};

/// Result of feeding a completion event to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Advanced { from: Option<usize>, to: usize },
    /// Same index completed twice.
    Duplicate(usize),
    /// Completion for a paragraph behind the current position.
    Behind { index: usize, last_completed: usize },
    /// Utterance belongs to a different chapter.
    ForeignChapter,
    /// Not an utterance id this core issued.
    Unparseable,
}

impl CompletionOutcome {
    pub fn advanced(&self) -> bool {
        matches!(self, Self::Advanced { .. })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    session: SessionId,
    chapter: Option<ChapterId>,
    last_completed: Option<usize>,
    speaking: Option<usize>,
    latest_reported: Option<usize>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Engine events
    // -----------------------------------------------------------------------

    pub fn on_paragraph_completed(&mut self, utterance_id: &str) -> CompletionOutcome {
        let Some(index) = self.attribute(utterance_id) else {
            return self.rejection(utterance_id);
        };

        if self.speaking == Some(index) {
            self.speaking = None;
        }

        match self.last_completed {
            Some(last) if index == last => CompletionOutcome::Duplicate(index),
            Some(last) if index < last => CompletionOutcome::Behind {
                index,
                last_completed: last,
            },
            from => {
                self.last_completed = Some(index);
                CompletionOutcome::Advanced { from, to: index }
            }
        }
    }

    /// Mark `utterance_id` as being spoken.  Returns the paragraph index when
    /// the id belongs to this chapter.
    pub fn on_paragraph_started(&mut self, utterance_id: &str) -> Option<usize> {
        let index = self.attribute(utterance_id)?;
        self.speaking = Some(index);
        Some(index)
    }

    // -----------------------------------------------------------------------
    // Document-view reports
    // -----------------------------------------------------------------------

    /// Apply a report that already passed the stale-event filter.  `index`
    /// is the paragraph the view says is current, i.e. `index - 1` is done.
    ///
    /// Returns `true` when the completed index moved.
    pub fn on_position_report(&mut self, index: usize) -> bool {
        self.latest_reported = self.latest_reported.max(Some(index));

        if self.speaking.is_some() {
            log::debug!("tracker: engine is speaking, report {index} not applied");
            return false;
        }
        let Some(done) = index.checked_sub(1) else {
            return false;
        };
        if self.last_completed.is_some_and(|last| last >= done) {
            return false;
        }
        self.last_completed = Some(done);
        true
    }

    // -----------------------------------------------------------------------
    // Session boundaries
    // -----------------------------------------------------------------------

    /// New chapter: the persisted position replaces whatever was tracked.
    pub fn reset(&mut self, chapter: ChapterId, persisted: Option<usize>) {
        log::debug!(
            "tracker: reset to chapter {chapter} at {}",
            persisted.map_or(-1, |n| n as i64)
        );
        self.chapter = Some(chapter);
        self.last_completed = persisted;
        self.latest_reported = persisted;
        self.speaking = None;
    }

    /// Same chapter, new session after a wake.  The position only carries
    /// forward.
    pub fn begin_session(&mut self, session: SessionId, resume_last_completed: Option<usize>) {
        self.session = session;
        self.last_completed = self.last_completed.max(resume_last_completed);
        self.speaking = None;
    }

    /// Same chapter, new session starting at `paragraph` (user seek).  The
    /// position is rebased, backwards included.
    pub fn rebase(&mut self, session: SessionId, paragraph: usize) {
        self.session = session;
        self.last_completed = paragraph.checked_sub(1);
        self.latest_reported = Some(paragraph);
        self.speaking = None;
    }

    /// Engine stopped; nothing is being spoken.
    pub fn mark_idle(&mut self) {
        self.speaking = None;
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> PlaybackPosition {
        PlaybackPosition {
            last_completed: self.last_completed,
            is_speaking: self.speaking.is_some(),
        }
    }

    /// Paragraph to highlight and to play next.
    pub fn next_index(&self) -> usize {
        self.snapshot().next_index()
    }

    /// Paragraph currently being spoken, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.speaking
    }

    pub fn latest_reported(&self) -> Option<usize> {
        self.latest_reported
    }

    /// Highest index any source has established this session.
    pub fn latest_known_index(&self) -> Option<usize> {
        self.latest_reported.max(self.last_completed)
    }

    pub fn chapter(&self) -> Option<&ChapterId> {
        self.chapter.as_ref()
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn attribute(&self, utterance_id: &str) -> Option<usize> {
        let parsed = UtteranceId::parse(utterance_id)?;
        match (&parsed.chapter, &self.chapter) {
            (Some(theirs), Some(ours)) if theirs != ours => None,
            _ => Some(parsed.index),
        }
    }

    fn rejection(&self, utterance_id: &str) -> CompletionOutcome {
        if UtteranceId::parse(utterance_id).is_none() {
            log::warn!("tracker: unparseable utterance id {utterance_id:?}");
            CompletionOutcome::Unparseable
        } else {
            log::debug!("tracker: utterance {utterance_id} is not from the current chapter");
            CompletionOutcome::ForeignChapter
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(chapter: i64, n: usize) -> String {
        UtteranceId::new(&ChapterId::from(chapter), n).into_string()
    }

    fn tracker_at(chapter: i64, persisted: Option<usize>) -> PositionTracker {
        let mut t = PositionTracker::new();
        t.reset(ChapterId::from(chapter), persisted);
        t
    }

    #[test]
    fn completions_only_move_forward() {
        let mut t = tracker_at(1, None);

        // Arbitrary interleaving including repeats and late arrivals.
        let order = [0, 1, 3, 2, 3, 1, 5, 4, 5, 6];
        let mut seen = Vec::new();
        for n in order {
            t.on_paragraph_completed(&id(1, n));
            seen.push(t.snapshot().last_completed);
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(t.snapshot().last_completed, Some(6));
    }

    #[test]
    fn duplicate_completion_is_noop() {
        let mut t = tracker_at(1, Some(3));
        assert_eq!(t.on_paragraph_completed(&id(1, 3)), CompletionOutcome::Duplicate(3));
        assert_eq!(
            t.on_paragraph_completed(&id(1, 2)),
            CompletionOutcome::Behind { index: 2, last_completed: 3 }
        );
        assert_eq!(t.snapshot().last_completed, Some(3));
    }

    #[test]
    fn first_completion_advances_from_nothing() {
        let mut t = tracker_at(1, None);
        assert_eq!(
            t.on_paragraph_completed(&id(1, 0)),
            CompletionOutcome::Advanced { from: None, to: 0 }
        );
    }

    #[test]
    fn started_never_moves_completed_index() {
        let mut t = tracker_at(1, Some(9));

        assert_eq!(t.on_paragraph_started(&id(1, 10)), Some(10));
        assert_eq!(t.snapshot().last_completed, Some(9));
        assert!(t.snapshot().is_speaking);
        assert_eq!(t.next_index(), 10);

        t.on_paragraph_started(&id(1, 11));
        assert_eq!(t.snapshot().last_completed, Some(9));
    }

    #[test]
    fn foreign_and_garbage_ids_rejected() {
        let mut t = tracker_at(1, Some(2));
        assert_eq!(t.on_paragraph_completed(&id(2, 7)), CompletionOutcome::ForeignChapter);
        assert_eq!(t.on_paragraph_completed("tts-42"), CompletionOutcome::Unparseable);
        assert_eq!(t.on_paragraph_started(&id(2, 7)), None);
        assert_eq!(t.snapshot().last_completed, Some(2));
    }

    #[test]
    fn bare_utterance_id_is_attributed_to_current_chapter() {
        let mut t = tracker_at(1, None);
        assert!(t.on_paragraph_completed("utterance_4").advanced());
        assert_eq!(t.snapshot().last_completed, Some(4));
    }

    #[test]
    fn reports_apply_only_when_engine_silent() {
        let mut t = tracker_at(1, Some(2));

        t.on_paragraph_started(&id(1, 3));
        assert!(!t.on_position_report(8));
        assert_eq!(t.snapshot().last_completed, Some(2));
        assert_eq!(t.latest_reported(), Some(8));

        t.mark_idle();
        assert!(t.on_position_report(8));
        assert_eq!(t.snapshot().last_completed, Some(7));
        assert!(!t.on_position_report(5));
        assert!(!t.on_position_report(0));
    }

    #[test]
    fn wake_mid_utterance_replays_interrupted_paragraph() {
        let mut t = tracker_at(1, None);
        for n in 0..=9 {
            t.on_paragraph_completed(&id(1, n));
        }
        // Paragraph 10 was cut off by the screen turning off.
        t.on_paragraph_started(&id(1, 10));

        t.begin_session(SessionId(2), Some(9));

        assert_eq!(t.snapshot().last_completed, Some(9));
        assert!(!t.snapshot().is_speaking);
        assert_eq!(t.next_index(), 10);
    }

    #[test]
    fn wake_never_regresses_position() {
        let mut t = tracker_at(1, Some(12));
        t.begin_session(SessionId(2), Some(8));
        assert_eq!(t.snapshot().last_completed, Some(12));
        t.begin_session(SessionId(3), None);
        assert_eq!(t.snapshot().last_completed, Some(12));
    }

    #[test]
    fn rebase_can_move_backwards() {
        let mut t = tracker_at(1, Some(12));
        t.rebase(SessionId(2), 4);
        assert_eq!(t.snapshot().last_completed, Some(3));
        t.rebase(SessionId(3), 0);
        assert_eq!(t.snapshot().last_completed, None);
        assert_eq!(t.next_index(), 0);
    }

    #[test]
    fn reset_replaces_position_for_new_chapter() {
        let mut t = tracker_at(1, Some(40));
        t.reset(ChapterId::from(2), None);
        assert_eq!(t.snapshot(), PlaybackPosition::default());
        assert_eq!(t.chapter(), Some(&ChapterId::from(2)));
    }
}

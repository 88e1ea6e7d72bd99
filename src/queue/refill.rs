//! Queue refill controller.
//!
//! Keeps the engine's own playback queue topped up in batches while
//! surviving transient append failures.
//!
//! ```text
//! refill(session, from)
//!   ├─ session != current            → StaleSession
//!   ├─ from >= total                 → Exhausted
//!   ├─ queue_depth > low_watermark   → NotNeeded
//!   └─ append(batch) × max_attempts (linear backoff)
//!        ├─ Ok                       → Refilled      (window extended)
//!        └─ all failed
//!             ├─ queue_depth == 0    → speak_now once → FellBack
//!             └─ otherwise           → Deferred (retry on next trigger)
//! ```

use std::sync::Arc;

use crate::config::QueueConfig;
use crate::engine::{EngineError, SpeechEngine};
use crate::session::{PlaybackSession, SessionId};

use super::batch::{build_batch_limited, Batch};
use super::window::QueueWindow;

/// Attempts at the initial `speak_now` before reporting failure.
const START_ATTEMPTS: u32 = 2;

// ---------------------------------------------------------------------------
// RefillOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefillOutcome {
    /// `count` paragraphs appended to the engine queue.
    Refilled { count: usize },
    /// Appends failed on an empty engine queue; `count` paragraphs were sent
    /// with `speak_now` instead.
    FellBack { count: usize },
    /// Engine queue still above the low watermark.
    NotNeeded { depth: usize },
    /// Every paragraph of the session has already been enqueued.
    Exhausted,
    /// Appends failed while the engine still had audio queued.
    Deferred {
        consecutive_failures: u32,
        /// Set once the deferral streak reaches the configured notice
        /// threshold.
        may_stall: bool,
    },
    /// The request referred to a superseded session and was discarded.
    StaleSession,
}

impl RefillOutcome {
    /// Whether paragraphs actually reached the engine.
    pub fn did_refill(&self) -> bool {
        matches!(self, Self::Refilled { .. } | Self::FellBack { .. })
    }
}

// ---------------------------------------------------------------------------
// RefillController
// ---------------------------------------------------------------------------

/// Owns the [`QueueWindow`] and the next-paragraph-to-enqueue index.
pub struct RefillController {
    engine: Arc<dyn SpeechEngine>,
    config: QueueConfig,
    session: Option<PlaybackSession>,
    window: Option<QueueWindow>,
    next_index: usize,
    consecutive_failures: u32,
    queued_this_session: bool,
}

impl RefillController {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: QueueConfig) -> Self {
        Self {
            engine,
            config,
            session: None,
            window: None,
            next_index: 0,
            consecutive_failures: 0,
            queued_this_session: false,
        }
    }

    /// Bind `session` and hand the engine its first batch via `speak_now`.
    ///
    /// Returns the number of paragraphs the engine accepted.  `Ok(0)` means
    /// there was nothing left to speak from `from_index`.
    pub async fn start(
        &mut self,
        session: PlaybackSession,
        from_index: usize,
    ) -> Result<usize, EngineError> {
        self.window = None;
        self.next_index = from_index;
        self.consecutive_failures = 0;
        self.queued_this_session = false;

        let batch = self.batch_for(&session, from_index);
        self.session = Some(session);

        if batch.is_empty() {
            log::info!("refill: nothing to speak from index {from_index}");
            return Ok(0);
        }

        let mut last_err = EngineError::Unavailable;
        for attempt in 1..=START_ATTEMPTS {
            match self
                .engine
                .speak_now(&batch.texts, &batch.utterance_ids)
                .await
            {
                Ok(count) => {
                    log::info!(
                        "refill: started at {from_index} with {} paragraphs (attempt {attempt})",
                        batch.len()
                    );
                    self.accept(batch, true);
                    return Ok(count);
                }
                Err(e) => {
                    log::warn!("refill: speak_now attempt {attempt} failed: {e}");
                    last_err = e;
                }
            }
        }

        log::error!("refill: could not start playback at {from_index}: {last_err}");
        Err(last_err)
    }

    /// Top up the engine queue from `from_index` if it has run low.
    pub async fn refill(&mut self, session: SessionId, from_index: usize) -> RefillOutcome {
        let Some(current) = self.session.clone() else {
            log::debug!("refill: no active session, discarding request for {session}");
            return RefillOutcome::StaleSession;
        };
        if current.id() != session {
            log::debug!(
                "refill: discarding request for {session}, current session is {}",
                current.id()
            );
            return RefillOutcome::StaleSession;
        }
        if from_index >= current.total_count() {
            return RefillOutcome::Exhausted;
        }

        let depth = match self.engine.queue_depth().await {
            Ok(d) => d,
            Err(e) => {
                log::warn!("refill: queue depth unavailable: {e}");
                return self.defer();
            }
        };
        if depth > self.config.low_watermark {
            return RefillOutcome::NotNeeded { depth };
        }

        let batch = self.batch_for(&current, from_index);
        let attempts = self.config.max_append_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .engine
                .append_to_queue(&batch.texts, &batch.utterance_ids)
                .await
            {
                Ok(true) => {
                    let count = batch.len();
                    log::debug!(
                        "refill: appended {count} paragraphs from {from_index} (attempt {attempt}, depth was {depth})"
                    );
                    self.accept(batch, false);
                    return RefillOutcome::Refilled { count };
                }
                Ok(false) => log::warn!("refill: addToBatch attempt {attempt} declined"),
                Err(e) => log::warn!("refill: addToBatch attempt {attempt} failed: {e}"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.backoff(attempt)).await;
            }
        }

        // Every append failed.  Only interrupt the engine if it has nothing
        // left to say; otherwise let the next trigger try again.
        match self.engine.queue_depth().await {
            Ok(0) => {
                log::warn!("refill: appends exhausted on empty queue, falling back to speak_now");
                match self
                    .engine
                    .speak_now(&batch.texts, &batch.utterance_ids)
                    .await
                {
                    Ok(_) => {
                        let count = batch.len();
                        self.accept(batch, true);
                        RefillOutcome::FellBack { count }
                    }
                    Err(e) => {
                        log::error!("refill: speak_now fallback failed: {e}");
                        self.defer()
                    }
                }
            }
            Ok(depth) => {
                log::warn!("refill: appends exhausted, {depth} utterances still queued, deferring");
                self.defer()
            }
            Err(e) => {
                log::warn!("refill: queue depth unavailable after retries: {e}");
                self.defer()
            }
        }
    }

    /// Drop the window and the bound session.  Any refill in flight for the
    /// old session becomes stale.
    pub fn invalidate(&mut self) {
        if let Some(session) = &self.session {
            log::debug!("refill: invalidating window for session {}", session.id());
        }
        self.session = None;
        self.window = None;
        self.consecutive_failures = 0;
    }

    /// Stop the engine and invalidate.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.invalidate();
        self.engine.stop().await
    }

    /// Whether paragraphs of the current session are still waiting to be
    /// handed to the engine.
    pub fn has_remaining(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| self.next_index < s.total_count())
    }

    /// Whether anything reached the engine since the last `start`.
    pub fn queued_this_session(&self) -> bool {
        self.queued_this_session
    }

    /// Next paragraph to hand to the engine.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    pub fn window(&self) -> Option<&QueueWindow> {
        self.window.as_ref()
    }

    /// Drop paragraphs up to and including `last_completed` from the window.
    pub fn retire_through(&mut self, last_completed: usize) {
        if let Some(window) = &self.window {
            self.window = Some(window.retired_through(last_completed));
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(PlaybackSession::id)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn batch_for(&self, session: &PlaybackSession, from_index: usize) -> Batch {
        build_batch_limited(
            session.chapter(),
            session.paragraphs(),
            Some(from_index as i64),
            self.config.batch_size.max(1),
        )
    }

    /// Record a batch the engine accepted.  `replaced` means the engine's
    /// queue was flushed first (`speak_now`).
    fn accept(&mut self, batch: Batch, replaced: bool) {
        self.next_index = batch.end_index();
        self.consecutive_failures = 0;
        self.queued_this_session = true;
        self.window = Some(match (&self.window, replaced) {
            (Some(window), false) => window.extended(&batch),
            _ => QueueWindow::from_batch(&batch),
        });
    }

    fn defer(&mut self) -> RefillOutcome {
        self.consecutive_failures += 1;
        let may_stall = self.consecutive_failures == self.config.stall_notice_after;
        if may_stall {
            log::error!(
                "refill: {} consecutive refill failures, playback may stop",
                self.consecutive_failures
            );
        }
        RefillOutcome::Deferred {
            consecutive_failures: self.consecutive_failures,
            may_stall,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SimulatedEngine;
    use crate::session::ChapterId;

    fn config() -> QueueConfig {
        QueueConfig {
            backoff_step_ms: 1,
            ..QueueConfig::default()
        }
    }

    fn session(id: u64, total: usize) -> PlaybackSession {
        let paragraphs: Vec<String> = (0..total).map(|i| format!("paragraph {i}")).collect();
        PlaybackSession::new(SessionId(id), ChapterId::from(5), paragraphs.into())
    }

    fn controller(engine: &Arc<SimulatedEngine>) -> RefillController {
        RefillController::new(Arc::clone(engine) as Arc<dyn SpeechEngine>, config())
    }

    #[tokio::test]
    async fn start_sends_first_batch() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);

        let count = ctl.start(session(1, 60), 10).await.unwrap();

        assert_eq!(count, 25);
        assert_eq!(ctl.next_index(), 35);
        assert!(ctl.queued_this_session());
        assert_eq!(engine.peek_next().as_deref(), Some("chapter_5_utterance_10"));
        assert_eq!(ctl.window().map(QueueWindow::start_index), Some(10));
    }

    #[tokio::test]
    async fn start_retries_once_then_fails() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);

        engine.fail_next_speaks(1);
        assert!(ctl.start(session(1, 10), 0).await.is_ok());

        engine.fail_next_speaks(2);
        assert!(ctl.start(session(2, 10), 0).await.is_err());
        assert!(!ctl.queued_this_session());
        assert_eq!(engine.speak_now_calls(), 4);
    }

    #[tokio::test]
    async fn refill_skipped_above_watermark() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(1, 60), 0).await.unwrap();

        let outcome = ctl.refill(SessionId(1), ctl.next_index()).await;

        assert_eq!(outcome, RefillOutcome::NotNeeded { depth: 25 });
        assert_eq!(engine.append_calls(), 0);
    }

    #[tokio::test]
    async fn refill_appends_when_low() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(1, 60), 0).await.unwrap();
        engine.drain_silently(21);

        let outcome = ctl.refill(SessionId(1), ctl.next_index()).await;

        assert_eq!(outcome, RefillOutcome::Refilled { count: 25 });
        assert_eq!(ctl.next_index(), 50);
        assert_eq!(engine.queued_ids().len(), 29);
        let window = ctl.window().unwrap();
        assert_eq!((window.start_index(), window.end_index()), (0, 50));
    }

    #[tokio::test]
    async fn retired_paragraphs_stay_out_after_refill() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(1, 60), 0).await.unwrap();
        engine.drain_silently(21);

        ctl.retire_through(20);
        ctl.refill(SessionId(1), ctl.next_index()).await;

        let window = ctl.window().unwrap();
        assert_eq!((window.start_index(), window.end_index()), (21, 50));
        assert!(!window.contains(20));
    }

    #[tokio::test]
    async fn exhausted_appends_on_empty_queue_fall_back_once() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(1, 100), 0).await.unwrap();
        engine.drain_silently(25);
        engine.fail_next_appends(3);
        let before = ctl.next_index();
        let speaks_before = engine.speak_now_calls();

        let outcome = ctl.refill(SessionId(1), before).await;

        assert_eq!(outcome, RefillOutcome::FellBack { count: 25 });
        assert!(outcome.did_refill());
        assert_eq!(engine.append_calls(), 3);
        assert_eq!(engine.speak_now_calls() - speaks_before, 1);
        assert_eq!(ctl.next_index(), before + 25);
        assert_eq!(engine.peek_next().as_deref(), Some("chapter_5_utterance_25"));
    }

    #[tokio::test]
    async fn exhausted_appends_with_audio_queued_defer() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(1, 200), 0).await.unwrap();
        engine.drain_silently(22);

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            engine.fail_next_appends(3);
            outcomes.push(ctl.refill(SessionId(1), ctl.next_index()).await);
        }

        assert_eq!(
            outcomes,
            vec![
                RefillOutcome::Deferred { consecutive_failures: 1, may_stall: false },
                RefillOutcome::Deferred { consecutive_failures: 2, may_stall: false },
                RefillOutcome::Deferred { consecutive_failures: 3, may_stall: true },
            ]
        );
        assert_eq!(ctl.next_index(), 25);
        assert_eq!(engine.speak_now_calls(), 1);

        // A successful refill clears the streak.
        let outcome = ctl.refill(SessionId(1), ctl.next_index()).await;
        assert!(outcome.did_refill());
        assert_eq!(ctl.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn stale_session_is_discarded() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(2, 60), 0).await.unwrap();
        engine.drain_silently(25);

        assert_eq!(ctl.refill(SessionId(1), 25).await, RefillOutcome::StaleSession);

        ctl.invalidate();
        assert_eq!(ctl.refill(SessionId(2), 25).await, RefillOutcome::StaleSession);
        assert_eq!(engine.append_calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_at_end_of_chapter() {
        let engine = Arc::new(SimulatedEngine::new());
        let mut ctl = controller(&engine);
        ctl.start(session(1, 10), 0).await.unwrap();

        assert!(!ctl.has_remaining());
        assert_eq!(ctl.refill(SessionId(1), 10).await, RefillOutcome::Exhausted);
    }
}

//! Sync orchestrator: the single event loop that owns every component.
//!
//! [`SyncOrchestrator`] owns the tracker, refill controller, wake coordinator
//! and chapter handler, and responds to [`SyncEvent`]s received over a
//! `tokio::sync::mpsc` channel.  Nothing else mutates them, so components
//! never see each other's state except as snapshots passed in here.
//!
//! # Event flow
//!
//! ```text
//! OpenChapter ─▶ flush previous chapter (if any) ─▶ open_chapter
//!                  ├─ Started   → new session, highlight, [autoplay] start
//!                  └─ Conflict  → SyncNotice::ChapterConflict, wait for ResolveConflict
//!
//! UtteranceCompleted ─▶ [dropped while waking, outside the queue window,
//!                       or not yet reached] tracker ─▶ persist ─▶ refill?
//! QueueEmpty         ─▶ emergency refill | start failure | chapter end
//! View(msg)          ─▶ stale-event filter ─▶ save → tracker
//!                                            tts-queue → seek / start
//! ScreenPower(true)  ─▶ begin_wake, stop engine ... WakeSettled ─▶ resolve
//!                       index, new session, restart, complete_wake (grace)
//! ```

use std::sync::{Arc, MutexGuard};
use std::time::Instant;

use tokio::sync::mpsc;

use crate::config::{AppConfig, TimingConfig};
use crate::engine::{EngineEvent, SpeechEngine};
use crate::position::{classify, CompletionOutcome, FilterContext, PositionTracker};
use crate::queue::{clamp_paragraph_index, RefillController, RefillOutcome};
use crate::ratelog::RateLimitedLog;
use crate::session::{ChapterId, PlaybackPosition, PlaybackSession, SessionId, UtteranceId};
use crate::store::{self, ProgressStore};
use crate::transition::{
    resolve_index, ChapterConflict, ChapterOpen, ChapterTransitionHandler, InFlight, Resolution,
    WakeCoordinator,
};
use crate::view::{DocumentView, ViewMessage};

use super::autostop::{AutoStop, AutoStopReason};
use super::state::{new_shared_state, PlaybackPhase, ReaderState, SharedState};

// ---------------------------------------------------------------------------
// Events and notices
// ---------------------------------------------------------------------------

/// Everything the orchestrator reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    OpenChapter {
        chapter: ChapterId,
        paragraphs: Vec<String>,
        autoplay: bool,
    },
    /// Start playback, from the tracked position or from `from`.
    Play { from: Option<usize> },
    Seek { paragraph: usize },
    Stop,
    UtteranceStarted(String),
    UtteranceCompleted(String),
    QueueEmpty,
    View(ViewMessage),
    /// Raw JSON posted by the document view.
    ViewJson(String),
    ScreenPower(bool),
    /// Scheduled internally `wake_settle_ms` after screen-on.
    WakeSettled { session: SessionId },
    ResolveConflict(Resolution),
}

impl From<EngineEvent> for SyncEvent {
    fn from(event: EngineEvent) -> Self {
        match event {
            EngineEvent::Started(id) => SyncEvent::UtteranceStarted(id),
            EngineEvent::Completed(id) => SyncEvent::UtteranceCompleted(id),
            EngineEvent::QueueEmpty => SyncEvent::QueueEmpty,
        }
    }
}

/// Outbound notifications for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    ChapterFinished { chapter: ChapterId },
    /// Refills keep failing while the engine still has audio.
    PlaybackMayStall { failed_refills: u32 },
    ChapterConflict(ChapterConflict),
    AutoStopped(AutoStopReason),
    PlaybackFailed { reason: String },
}

/// Chapter open held back by a conflict.
#[derive(Debug)]
struct PendingOpen {
    chapter: ChapterId,
    paragraphs: Vec<String>,
    autoplay: bool,
}

// ---------------------------------------------------------------------------
// SyncOrchestrator
// ---------------------------------------------------------------------------

/// Drives the read-aloud sync core.
///
/// Create with [`SyncOrchestrator::new`], then call [`run`](Self::run)
/// inside a tokio task, or feed events one at a time with
/// [`handle`](Self::handle).
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tts_sync::config::AppConfig;
/// use tts_sync::engine::SimulatedEngine;
/// use tts_sync::pipeline::{SyncEvent, SyncOrchestrator};
/// use tts_sync::store::MemoryStore;
/// use tts_sync::view::RecordingView;
///
/// # async fn example() {
/// let (notice_tx, _notice_rx) = tokio::sync::mpsc::channel(16);
/// let orchestrator = SyncOrchestrator::new(
///     AppConfig::default(),
///     Arc::new(SimulatedEngine::new()),
///     Arc::new(RecordingView::new()),
///     Arc::new(MemoryStore::new()),
///     Arc::new(MemoryStore::new()),
///     notice_tx,
/// );
///
/// let (event_tx, event_rx) = tokio::sync::mpsc::channel(64);
/// tokio::spawn(orchestrator.run(event_rx));
/// event_tx
///     .send(SyncEvent::OpenChapter {
///         chapter: 1.into(),
///         paragraphs: vec!["It was a dark and stormy night.".into()],
///         autoplay: true,
///     })
///     .await
///     .unwrap();
/// # }
/// ```
pub struct SyncOrchestrator {
    state: SharedState,
    view: Arc<dyn DocumentView>,
    durable: Arc<dyn ProgressStore>,
    cache: Arc<dyn ProgressStore>,
    notices: mpsc::Sender<SyncNotice>,
    timing: TimingConfig,

    refill: RefillController,
    tracker: PositionTracker,
    wake: WakeCoordinator,
    chapters: ChapterTransitionHandler,
    auto_stop: AutoStop,

    phase: PlaybackPhase,
    session: Option<PlaybackSession>,
    pending_open: Option<PendingOpen>,
    /// Last completed paragraph as reported by the engine before a wake.
    wake_engine_index: Option<usize>,
    /// Highest paragraph the engine has started since its queue was rebuilt.
    furthest_started: Option<usize>,
    /// Open chapter already flushed as complete.
    flushed: bool,
    timers: Option<mpsc::Sender<SyncEvent>>,
    drops: RateLimitedLog,
}

impl SyncOrchestrator {
    /// Create a new orchestrator.
    ///
    /// # Arguments
    ///
    /// * `engine` : platform speech engine (or `SimulatedEngine`).
    /// * `view`   : embedded document view.
    /// * `durable`: durable progress store.
    /// * `cache`  : fast progress cache.
    /// * `notices`: host notifications; sends never block the loop.
    pub fn new(
        config: AppConfig,
        engine: Arc<dyn SpeechEngine>,
        view: Arc<dyn DocumentView>,
        durable: Arc<dyn ProgressStore>,
        cache: Arc<dyn ProgressStore>,
        notices: mpsc::Sender<SyncNotice>,
    ) -> Self {
        Self {
            state: new_shared_state(),
            refill: RefillController::new(engine, config.queue.clone()),
            chapters: ChapterTransitionHandler::new(Arc::clone(&durable), Arc::clone(&cache)),
            wake: WakeCoordinator::new(config.timing.grace()),
            auto_stop: AutoStop::new(config.auto_stop.clone()),
            tracker: PositionTracker::new(),
            drops: RateLimitedLog::new("sync", config.timing.grace()),
            timing: config.timing,
            view,
            durable,
            cache,
            notices,
            phase: PlaybackPhase::Idle,
            session: None,
            pending_open: None,
            wake_engine_index: None,
            furthest_started: None,
            flushed: false,
            timers: None,
        }
    }

    /// Handle to the snapshot the orchestrator publishes after every event.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn session_id(&self) -> SessionId {
        self.wake.current_session()
    }

    pub fn position(&self) -> PlaybackPosition {
        self.tracker.snapshot()
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run the orchestrator until `events` is closed.
    ///
    /// Wake settling is scheduled on an internal timer channel, so only this
    /// loop ever calls [`handle`](Self::handle).
    pub async fn run(mut self, mut events: mpsc::Receiver<SyncEvent>) {
        let (timer_tx, mut timer_rx) = mpsc::channel(8);
        self.timers = Some(timer_tx);

        loop {
            let event = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                Some(event) = timer_rx.recv() => event,
            };
            self.handle(event, Instant::now()).await;
        }

        log::info!("sync: event channel closed, orchestrator shutting down");
    }

    /// Process one event as of `now`.
    pub async fn handle(&mut self, event: SyncEvent, now: Instant) {
        if let Some(reason) = self.auto_stop.check(now) {
            self.auto_stopped(reason).await;
        }

        match event {
            SyncEvent::OpenChapter {
                chapter,
                paragraphs,
                autoplay,
            } => self.open_chapter(chapter, paragraphs, autoplay, now).await,
            SyncEvent::Play { from } => self.play(from, now).await,
            SyncEvent::Seek { paragraph } => self.seek(paragraph, now).await,
            SyncEvent::Stop => self.stop().await,
            SyncEvent::UtteranceStarted(id) => self.utterance_started(&id, now).await,
            SyncEvent::UtteranceCompleted(id) => self.utterance_completed(&id, now).await,
            SyncEvent::QueueEmpty => self.queue_empty(now).await,
            SyncEvent::View(message) => self.view_message(message, now).await,
            SyncEvent::ViewJson(raw) => match ViewMessage::parse(&raw) {
                Ok(message) => self.view_message(message, now).await,
                Err(e) => log::warn!("sync: {e}"),
            },
            SyncEvent::ScreenPower(true) => self.screen_on(now).await,
            SyncEvent::ScreenPower(false) => self.screen_off().await,
            SyncEvent::WakeSettled { session } => self.wake_settled(session, now).await,
            SyncEvent::ResolveConflict(resolution) => {
                self.resolve_conflict(resolution, now).await
            }
        }

        self.publish();
    }

    // -----------------------------------------------------------------------
    // Chapter lifecycle
    // -----------------------------------------------------------------------

    async fn open_chapter(
        &mut self,
        chapter: ChapterId,
        paragraphs: Vec<String>,
        autoplay: bool,
        now: Instant,
    ) {
        log::info!("sync: opening chapter {chapter} ({} paragraphs)", paragraphs.len());
        let in_flight = self.in_flight();

        if let Some(previous) = self.session.clone() {
            if *previous.chapter() != chapter {
                if self.phase != PlaybackPhase::Idle {
                    self.halt().await;
                }
                if !self.flushed {
                    self.chapters
                        .finish_chapter(previous.chapter(), previous.total_count())
                        .await;
                    self.flushed = true;
                }
            }
        }

        let opened = self
            .chapters
            .open_chapter(&chapter, in_flight.clone(), &mut self.tracker)
            .await;

        match opened {
            ChapterOpen::Conflict(conflict) => {
                self.pending_open = Some(PendingOpen {
                    chapter,
                    paragraphs,
                    autoplay,
                });
                self.notify(SyncNotice::ChapterConflict(conflict));
            }
            ChapterOpen::Started { .. } => {
                self.pending_open = None;
                if in_flight.is_some_and(|f| f.chapter == chapter) {
                    log::debug!("sync: chapter {chapter} already playing, keeping session");
                    return;
                }
                self.install_chapter(chapter, paragraphs, now).await;
                if autoplay {
                    let from = self.tracker.next_index();
                    self.start_playback(from, now).await;
                }
            }
        }
    }

    async fn resolve_conflict(&mut self, resolution: Resolution, now: Instant) {
        let Some(pending) = self.pending_open.take() else {
            log::warn!("sync: {resolution:?} received with no chapter conflict pending");
            return;
        };
        let Some((chapter, _)) = self
            .chapters
            .resolve_pending(resolution, &mut self.tracker)
            .await
        else {
            return;
        };

        match resolution {
            Resolution::KeepCurrent => {
                log::info!("sync: keeping current playback of chapter {chapter}");
            }
            Resolution::UseRequested => {
                let was_busy = self.phase.is_busy();
                self.install_chapter(pending.chapter, pending.paragraphs, now)
                    .await;
                if was_busy || pending.autoplay {
                    let from = self.tracker.next_index();
                    self.start_playback(from, now).await;
                }
            }
        }
    }

    /// Bind a new session to `chapter`.  The tracker must already hold the
    /// chapter's position.
    async fn install_chapter(&mut self, chapter: ChapterId, paragraphs: Vec<String>, now: Instant) {
        if self.phase != PlaybackPhase::Idle {
            self.halt().await;
        }
        self.end_wake(now);
        let id = self.wake.open_session();
        self.tracker.begin_session(id, None);
        self.session = Some(PlaybackSession::new(id, chapter, paragraphs.into()));
        self.flushed = false;
        self.wake.mark_chapter_transition(now);
        self.show(self.tracker.next_index()).await;
    }

    /// All paragraphs spoken.
    async fn chapter_end(&mut self) {
        let Some(session) = self.session.clone() else {
            return;
        };
        self.halt().await;
        self.chapters
            .finish_chapter(session.chapter(), session.total_count())
            .await;
        self.flushed = true;
        self.notify(SyncNotice::ChapterFinished {
            chapter: session.chapter().clone(),
        });
        if let Some(reason) = self.auto_stop.on_chapter_finished() {
            self.notify(SyncNotice::AutoStopped(reason));
        }
    }

    fn in_flight(&self) -> Option<InFlight> {
        if !self.phase.is_busy() {
            return None;
        }
        self.session.as_ref().map(|s| InFlight {
            chapter: s.chapter().clone(),
            last_completed: self.tracker.snapshot().last_completed,
        })
    }

    // -----------------------------------------------------------------------
    // Playback control
    // -----------------------------------------------------------------------

    async fn play(&mut self, from: Option<usize>, now: Instant) {
        if self.pending_open.is_some() {
            log::warn!("sync: play ignored while a chapter conflict is pending");
            return;
        }
        let next = self.tracker.next_index();
        let start = match from {
            Some(paragraph) if paragraph != next => self.reposition(paragraph, now).await,
            _ if self.phase.is_busy() => {
                log::debug!("sync: already playing");
                return;
            }
            // Wake still settling: resume here in a fresh session.
            _ if self.wake.is_transitioning() => self.reposition(next, now).await,
            _ => Some(next),
        };
        let Some(start) = start else {
            return;
        };
        if self.phase != PlaybackPhase::Idle {
            self.halt().await;
        }
        self.start_playback(start, now).await;
    }

    async fn seek(&mut self, paragraph: usize, now: Instant) {
        // A wake stopped the engine and was about to restart it.
        let resuming = self.wake.is_transitioning() && self.phase == PlaybackPhase::Stopping;
        let was_busy = self.phase.is_busy() || resuming;
        let Some(target) = self.reposition(paragraph, now).await else {
            log::warn!("sync: seek to {paragraph} with no chapter open");
            return;
        };
        if was_busy {
            self.halt().await;
            self.start_playback(target, now).await;
        }
    }

    async fn stop(&mut self) {
        if self.phase == PlaybackPhase::Idle {
            return;
        }
        log::info!("sync: stop at {}", self.tracker.snapshot().last_completed_index());
        self.halt().await;
        self.auto_stop.disarm();
        self.persist_position().await;
    }

    async fn auto_stopped(&mut self, reason: AutoStopReason) {
        if self.phase != PlaybackPhase::Idle {
            self.halt().await;
        }
        self.auto_stop.disarm();
        self.persist_position().await;
        self.notify(SyncNotice::AutoStopped(reason));
    }

    /// New session over the same chapter, positioned at `paragraph`.
    /// Ends a wake in progress.
    async fn reposition(&mut self, paragraph: usize, now: Instant) -> Option<usize> {
        let total = self.session.as_ref()?.total_count();
        let target = clamp_paragraph_index(paragraph as i64, total);
        self.end_wake(now);
        let current = self.session.as_ref()?;
        let id = self.wake.open_session();
        let next = current.supersede(id);
        self.session = Some(next);
        self.tracker.rebase(id, target);
        self.persist_position().await;
        self.show(target).await;
        Some(target)
    }

    /// Hand the engine its first batch.  Returns whether playback started.
    async fn start_playback(&mut self, from: usize, now: Instant) -> bool {
        self.end_wake(now);
        let Some(session) = self.session.clone() else {
            log::warn!("sync: play requested with no chapter open");
            return false;
        };
        if session.total_count() == 0 {
            log::warn!("sync: chapter {} has no paragraphs", session.chapter());
            return false;
        }
        let from = clamp_paragraph_index(from as i64, session.total_count());

        self.set_phase(PlaybackPhase::Starting);
        self.auto_stop.ensure_armed(now);
        self.furthest_started = None;

        let failure = match self.refill.start(session, from).await {
            Ok(n) if n > 0 => None,
            Ok(_) => Some("engine accepted no utterances".to_string()),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => {
                self.set_phase(PlaybackPhase::Playing);
                true
            }
            Some(reason) => {
                self.halt().await;
                self.auto_stop.disarm();
                self.notify(SyncNotice::PlaybackFailed { reason });
                false
            }
        }
    }

    /// Stop the engine and drop the window.  Ends in `Idle`.
    async fn halt(&mut self) {
        self.set_phase(PlaybackPhase::Stopping);
        if let Err(e) = self.refill.stop().await {
            log::warn!("sync: engine stop failed: {e}");
        }
        self.tracker.mark_idle();
        self.set_phase(PlaybackPhase::Idle);
    }

    // -----------------------------------------------------------------------
    // Engine events
    // -----------------------------------------------------------------------

    async fn utterance_started(&mut self, id: &str, now: Instant) {
        if self.wake.is_transitioning() {
            self.drops
                .debug("start during wake", now, || format!("dropped start {id} during wake"));
            return;
        }
        if let Some(index) = self.own_index(id) {
            if !self.in_window(index) {
                self.drops.debug("start outside queue window", now, || {
                    format!("dropped start {id} outside the queue window")
                });
                return;
            }
            self.furthest_started = self.furthest_started.max(Some(index));
        }
        if let Some(index) = self.tracker.on_paragraph_started(id) {
            self.highlight(index).await;
        }
    }

    async fn utterance_completed(&mut self, id: &str, now: Instant) {
        if self.wake.is_transitioning() {
            self.drops.debug("completion during wake", now, || {
                format!("dropped completion {id} during wake")
            });
            return;
        }
        if let Some(index) = self.own_index(id) {
            if !self.in_window(index) {
                self.drops.debug("completion outside queue window", now, || {
                    format!("dropped completion {id} outside the queue window")
                });
                return;
            }
            // Queue order: a paragraph past the next one must have started.
            let reached = index == self.tracker.next_index()
                || self.furthest_started.is_some_and(|s| index <= s);
            if !reached {
                self.drops.debug("completion not reached", now, || {
                    format!("dropped completion {id}, engine has not reached it")
                });
                return;
            }
        }

        match self.tracker.on_paragraph_completed(id) {
            CompletionOutcome::Advanced { to, .. } => {
                log::debug!("sync: completed {to}");
                self.refill.retire_through(to);
                self.persist_position().await;
                if let Some(reason) = self.auto_stop.on_paragraph_completed() {
                    self.auto_stopped(reason).await;
                    return;
                }
                self.maybe_refill().await;
            }
            CompletionOutcome::Duplicate(index) => {
                log::debug!("sync: duplicate completion for {index}");
            }
            CompletionOutcome::Behind {
                index,
                last_completed,
            } => {
                log::debug!("sync: late completion for {index}, already at {last_completed}");
            }
            CompletionOutcome::ForeignChapter | CompletionOutcome::Unparseable => {}
        }
    }

    async fn queue_empty(&mut self, now: Instant) {
        if self.wake.is_transitioning() || self.phase.ignores_queue_empty() {
            log::debug!("sync: queue empty ignored while {}", self.phase.label());
            return;
        }
        if self.phase == PlaybackPhase::Idle {
            self.drops
                .debug("queue empty idle", now, || "queue empty while idle".to_string());
            return;
        }

        if self.refill.has_remaining() {
            log::warn!(
                "sync: engine drained with paragraphs left, emergency refill from {}",
                self.refill.next_index()
            );
            self.refill_now().await;
            return;
        }

        if !self.refill.queued_this_session() {
            log::error!("sync: queue empty before anything was queued, treating as start failure");
            self.halt().await;
            self.auto_stop.disarm();
            self.notify(SyncNotice::PlaybackFailed {
                reason: "playback did not start".into(),
            });
            return;
        }

        self.chapter_end().await;
    }

    async fn maybe_refill(&mut self) {
        if self.phase == PlaybackPhase::Playing && self.refill.has_remaining() {
            self.refill_now().await;
        }
    }

    async fn refill_now(&mut self) {
        let Some(session) = self.refill.session_id() else {
            return;
        };
        self.set_phase(PlaybackPhase::Refilling);
        let outcome = self.refill.refill(session, self.refill.next_index()).await;
        self.set_phase(PlaybackPhase::Playing);

        match outcome {
            RefillOutcome::Deferred {
                consecutive_failures,
                may_stall: true,
            } => self.notify(SyncNotice::PlaybackMayStall {
                failed_refills: consecutive_failures,
            }),
            other => log::debug!("sync: refill → {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // Document view
    // -----------------------------------------------------------------------

    async fn view_message(&mut self, message: ViewMessage, now: Instant) {
        let Some(chapter) = self.session.as_ref().map(|s| s.chapter().clone()) else {
            log::debug!("sync: {} message with no chapter open", message.kind());
            return;
        };
        let Some(report) = message.report() else {
            log::debug!("sync: {} message without a usable index", message.kind());
            return;
        };

        let ctx = FilterContext {
            current_chapter: chapter,
            latest_known_index: self.tracker.latest_known_index(),
            current_index: self
                .tracker
                .current_index()
                .or(self.tracker.snapshot().last_completed),
            time_since_transition: self.wake.time_since_transition(now),
            grace: self.wake.grace(),
        };
        let verdict = classify(&report, &ctx);
        if verdict.is_ignored() {
            self.drops.debug(verdict.reason(), now, || {
                format!(
                    "dropped {} report {} ({})",
                    message.kind(),
                    report.index,
                    verdict.reason()
                )
            });
            return;
        }

        match message {
            ViewMessage::Save { .. } => {
                if self.tracker.on_position_report(report.index) {
                    self.persist_position().await;
                }
            }
            ViewMessage::TtsQueue { .. } => self.view_queue_request(report.index, now).await,
        }
    }

    async fn view_queue_request(&mut self, start: usize, now: Instant) {
        if !self.phase.is_busy() {
            self.play(Some(start), now).await;
            return;
        }
        if self.refill.window().is_some_and(|w| w.contains(start)) {
            log::debug!("sync: tts-queue from {start} already enqueued");
            return;
        }
        let next = self.tracker.next_index();
        if start < next {
            log::debug!("sync: tts-queue from {start} is behind position {next}");
            return;
        }
        if start > next {
            log::info!("sync: tts-queue skips ahead {} paragraphs to {start}", start - next);
        }
        self.seek(start, now).await;
    }

    // -----------------------------------------------------------------------
    // Screen power
    // -----------------------------------------------------------------------

    async fn screen_off(&mut self) {
        log::info!(
            "sync: screen off at {}",
            self.tracker.snapshot().last_completed_index()
        );
        self.persist_position().await;
    }

    async fn screen_on(&mut self, now: Instant) {
        if !self.phase.is_busy() {
            // Nothing to resume, but the view may reload.
            self.wake.mark_chapter_transition(now);
            return;
        }

        self.wake_engine_index = self.tracker.snapshot().last_completed;
        let session = self.wake.begin_wake(now);
        self.set_phase(PlaybackPhase::Stopping);
        if let Err(e) = self.refill.stop().await {
            log::warn!("sync: engine stop on wake failed: {e}");
        }
        self.tracker.mark_idle();
        self.schedule_wake_settle(session);
    }

    async fn wake_settled(&mut self, session: SessionId, now: Instant) {
        if !self.wake.is_transitioning() || session != self.wake.current_session() {
            log::debug!("sync: stale wake settle for session {session}");
            return;
        }
        let resume = self.phase == PlaybackPhase::Stopping;
        let Some(current) = self.session.clone() else {
            self.end_wake(now);
            return;
        };

        let chapter = current.chapter();
        let durable = store::read_or_none(self.durable.as_ref(), "durable", chapter).await;
        let cache = store::read_or_none(self.cache.as_ref(), "cache", chapter).await;
        let engine = self.wake_engine_index.take();
        let resolved = resolve_index(durable, cache, engine);

        self.session = Some(current.supersede(session));
        self.tracker.begin_session(session, resolved);
        let from = self.tracker.next_index();
        log::info!(
            "sync: resuming chapter {chapter} at {from} (durable {durable:?}, cache {cache:?}, engine {engine:?})"
        );
        self.show(from).await;

        if !resume {
            self.end_wake(now);
            return;
        }
        if from >= current.total_count() {
            self.end_wake(now);
            self.chapter_end().await;
            return;
        }
        self.start_playback(from, now).await;
    }

    /// Finish a wake transition, if one is running, and open the grace window.
    fn end_wake(&mut self, now: Instant) {
        if self.wake.is_transitioning() {
            self.wake.complete_wake(now);
            self.wake_engine_index = None;
        }
    }

    fn schedule_wake_settle(&self, session: SessionId) {
        let Some(tx) = self.timers.clone() else {
            log::debug!("sync: no timer channel, wake settle for {session} must be sent by the host");
            return;
        };
        let delay = self.timing.wake_settle();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(SyncEvent::WakeSettled { session }).await;
        });
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Paragraph index of an utterance id from the open chapter.
    fn own_index(&self, id: &str) -> Option<usize> {
        let parsed = UtteranceId::parse(id)?;
        let chapter = self.session.as_ref()?.chapter();
        match &parsed.chapter {
            Some(theirs) if theirs != chapter => None,
            _ => Some(parsed.index),
        }
    }

    fn in_window(&self, index: usize) -> bool {
        self.refill.window().is_some_and(|w| w.contains(index))
    }

    async fn persist_position(&self) {
        let (Some(session), Some(last)) =
            (self.session.as_ref(), self.tracker.snapshot().last_completed)
        else {
            return;
        };
        let complete = last + 1 >= session.total_count();
        let chapter = session.chapter();
        store::write_logged(self.durable.as_ref(), "durable", chapter, last, complete).await;
        store::write_logged(self.cache.as_ref(), "cache", chapter, last, complete).await;
    }

    async fn show(&self, index: usize) {
        let Some(total) = self.session.as_ref().map(PlaybackSession::total_count) else {
            return;
        };
        let Some(last) = total.checked_sub(1) else {
            return;
        };
        let index = index.min(last);
        if let Err(e) = self.view.scroll_to(index).await {
            log::debug!("sync: scroll_to({index}) failed: {e}");
        }
        self.highlight(index).await;
    }

    async fn highlight(&self, index: usize) {
        if let Err(e) = self.view.highlight_paragraph(index).await {
            log::debug!("sync: highlight({index}) failed: {e}");
        }
    }

    fn set_phase(&mut self, next: PlaybackPhase) {
        if !self.phase.can_transition_to(next) {
            log::error!(
                "sync: invalid phase transition {} → {}",
                self.phase.label(),
                next.label()
            );
        }
        self.phase = next;
    }

    fn notify(&self, notice: SyncNotice) {
        log::info!("sync: {notice:?}");
        if let Err(e) = self.notices.try_send(notice) {
            log::warn!("sync: notice not delivered: {e}");
        }
    }

    fn publish(&self) {
        let mut st = lock_state(&self.state);
        st.phase = self.phase;
        st.chapter = self.session.as_ref().map(|s| s.chapter().clone());
        st.session = self.wake.current_session();
        st.position = self.tracker.snapshot();
        st.total_paragraphs = self.session.as_ref().map_or(0, PlaybackSession::total_count);
        st.awaiting_resolution = self.pending_open.is_some();
        st.waking = self.wake.is_transitioning();
    }
}

fn lock_state(state: &SharedState) -> MutexGuard<'_, ReaderState> {
    match state.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

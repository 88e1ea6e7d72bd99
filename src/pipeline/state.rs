//! Playback phase machine and shared reader state.
//!
//! [`PlaybackPhase`] drives the orchestrator's state machine.  Hosts read it
//! via [`SharedState`] to render play/pause controls.
//!
//! [`ReaderState`] is the snapshot everything outside the event loop sees:
//! current phase, chapter, session and position.
//!
//! [`SharedState`] is a type alias for `Arc<Mutex<ReaderState>>`, cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex};

use crate::session::{ChapterId, PlaybackPosition, SessionId};

// ---------------------------------------------------------------------------
// PlaybackPhase
// ---------------------------------------------------------------------------

/// Phases of engine playback.
///
/// ```text
/// Idle ──play──▶ Starting ──engine accepted──▶ Playing ◀──▶ Refilling
///                   │                             │             │
///                   └─────────────┬───────────────┴─────────────┘
///                                 ▼
///                             Stopping ──▶ Idle
///                                 └──────▶ Starting   (restart)
/// ```
///
/// Staying in the same phase is always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackPhase {
    #[default]
    Idle,
    /// Initial batch is being handed to the engine.
    Starting,
    Playing,
    /// An append is in flight; the engine keeps speaking meanwhile.
    Refilling,
    /// Engine stop requested.
    Stopping,
}

impl PlaybackPhase {
    /// ```
    /// use tts_sync::pipeline::PlaybackPhase::*;
    ///
    /// assert!(Idle.can_transition_to(Starting));
    /// assert!(Refilling.can_transition_to(Playing));
    /// assert!(Stopping.can_transition_to(Starting));
    /// assert!(!Idle.can_transition_to(Playing));
    /// assert!(!Idle.can_transition_to(Refilling));
    /// ```
    pub fn can_transition_to(self, next: PlaybackPhase) -> bool {
        use PlaybackPhase::*;

        self == next
            || matches!(
                (self, next),
                (Idle, Starting)
                    | (Starting, Playing)
                    | (Playing, Refilling)
                    | (Refilling, Playing)
                    | (Playing | Starting | Refilling, Stopping)
                    | (Stopping, Idle)
                    | (Stopping, Starting)
            )
    }

    /// Returns `true` while the engine has (or is about to have) audio.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PlaybackPhase::Starting | PlaybackPhase::Playing | PlaybackPhase::Refilling
        )
    }

    /// Phases in which a queue-empty event is an artefact of our own calls.
    pub fn ignores_queue_empty(&self) -> bool {
        matches!(
            self,
            PlaybackPhase::Starting | PlaybackPhase::Stopping | PlaybackPhase::Refilling
        )
    }

    /// A short human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            PlaybackPhase::Idle => "Idle",
            PlaybackPhase::Starting => "Starting",
            PlaybackPhase::Playing => "Playing",
            PlaybackPhase::Refilling => "Refilling",
            PlaybackPhase::Stopping => "Stopping",
        }
    }
}

// ---------------------------------------------------------------------------
// ReaderState
// ---------------------------------------------------------------------------

/// Shared snapshot of the sync core.
///
/// Held behind [`SharedState`].  Only the orchestrator writes it.
#[derive(Debug, Clone, Default)]
pub struct ReaderState {
    pub phase: PlaybackPhase,

    /// Chapter currently open, `None` before the first open.
    pub chapter: Option<ChapterId>,

    pub session: SessionId,

    /// Authoritative position (last completed paragraph).
    pub position: PlaybackPosition,

    /// Total paragraphs in the open chapter.
    pub total_paragraphs: usize,

    /// A chapter conflict is waiting for `ResolveConflict`.
    pub awaiting_resolution: bool,

    /// Wake transition in progress; completions are being dropped.
    pub waking: bool,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`ReaderState`].
///
/// Lock for a short critical section; do **not** hold the lock across
/// `.await` points.
pub type SharedState = Arc<Mutex<ReaderState>>;

/// Construct a new [`SharedState`] wrapping a fresh [`ReaderState`].
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(ReaderState::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use PlaybackPhase::*;

    const ALL: [PlaybackPhase; 5] = [Idle, Starting, Playing, Refilling, Stopping];

    #[test]
    fn same_phase_is_always_allowed() {
        for phase in ALL {
            assert!(phase.can_transition_to(phase), "{phase:?}");
        }
    }

    #[test]
    fn every_busy_phase_can_stop() {
        for phase in [Starting, Playing, Refilling] {
            assert!(phase.can_transition_to(Stopping));
        }
        assert!(!Idle.can_transition_to(Stopping));
    }

    #[test]
    fn refill_only_from_playing() {
        for phase in ALL {
            let expected = matches!(phase, Playing | Refilling);
            assert_eq!(phase.can_transition_to(Refilling), expected, "{phase:?}");
        }
    }

    #[test]
    fn stopping_leads_to_idle_or_restart() {
        assert!(Stopping.can_transition_to(Idle));
        assert!(Stopping.can_transition_to(Starting));
        assert!(!Stopping.can_transition_to(Playing));
    }

    #[test]
    fn queue_empty_ignored_only_in_transitional_phases() {
        assert!(Starting.ignores_queue_empty());
        assert!(Refilling.ignores_queue_empty());
        assert!(Stopping.ignores_queue_empty());
        assert!(!Playing.ignores_queue_empty());
        assert!(!Idle.ignores_queue_empty());
    }

    #[test]
    fn busy_and_labels() {
        assert!(!Idle.is_busy());
        assert!(Playing.is_busy());
        assert!(!Stopping.is_busy());
        assert_eq!(Refilling.label(), "Refilling");
        assert_eq!(PlaybackPhase::default(), Idle);
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn shared_state_can_be_cloned_and_mutated() {
        let state = new_shared_state();
        let state2 = Arc::clone(&state);

        state.lock().unwrap().phase = Playing;
        assert_eq!(state2.lock().unwrap().phase, Playing);
    }

    #[test]
    fn fresh_state_is_idle_with_nothing_open() {
        let state = ReaderState::default();
        assert_eq!(state.phase, Idle);
        assert!(state.chapter.is_none());
        assert_eq!(state.position.last_completed_index(), -1);
        assert!(!state.waking);
    }
}

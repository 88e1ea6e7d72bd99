//! Wake/resume coordinator.
//!
//! Owns the session counter and the grace window that follows every
//! transition (screen wake or chapter change).
//!
//! ```text
//!            begin_wake(now)                complete_wake(now)
//!   Idle ──────────────────▶ Transitioning ──────────────────▶ Idle
//!          session += 1       (completions      grace_deadline =
//!                              dropped)          now + grace
//! ```

use std::time::{Duration, Instant};

use crate::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakePhase {
    Idle,
    Transitioning,
}

/// Snapshot of the transition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeTransition {
    pub in_progress: bool,
    pub grace_deadline: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct WakeCoordinator {
    grace: Duration,
    phase: WakePhase,
    session: SessionId,
    last_transition: Option<Instant>,
    grace_deadline: Option<Instant>,
}

impl WakeCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            phase: WakePhase::Idle,
            session: SessionId::default(),
            last_transition: None,
            grace_deadline: None,
        }
    }

    /// Screen came back on.  Supersedes the current session.
    pub fn begin_wake(&mut self, now: Instant) -> SessionId {
        self.phase = WakePhase::Transitioning;
        self.session = self.session.next();
        self.last_transition = Some(now);
        log::info!("wake: transition started, session {}", self.session);
        self.session
    }

    /// Playback resumed; open the grace window.
    pub fn complete_wake(&mut self, now: Instant) {
        if self.phase != WakePhase::Transitioning {
            log::debug!("wake: complete_wake outside a transition");
        }
        self.phase = WakePhase::Idle;
        self.open_grace(now);
        log::info!("wake: transition complete, grace for {:?}", self.grace);
    }

    /// A chapter change also makes the view's next reports suspect.
    pub fn mark_chapter_transition(&mut self, now: Instant) {
        self.open_grace(now);
    }

    /// New session id for a chapter open or seek.
    pub fn open_session(&mut self) -> SessionId {
        self.session = self.session.next();
        self.session
    }

    pub fn current_session(&self) -> SessionId {
        self.session
    }

    pub fn is_transitioning(&self) -> bool {
        self.phase == WakePhase::Transitioning
    }

    pub fn in_grace(&self, now: Instant) -> bool {
        self.grace_deadline.is_some_and(|deadline| now < deadline)
    }

    pub fn time_since_transition(&self, now: Instant) -> Option<Duration> {
        self.last_transition
            .map(|t| now.saturating_duration_since(t))
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn snapshot(&self) -> WakeTransition {
        WakeTransition {
            in_progress: self.is_transitioning(),
            grace_deadline: self.grace_deadline,
        }
    }

    fn open_grace(&mut self, now: Instant) {
        self.last_transition = Some(now);
        self.grace_deadline = Some(now + self.grace);
    }
}

/// Resume index: the furthest position any of the three sources knows.
///
/// ```
/// use tts_sync::transition::resolve_index;
///
/// assert_eq!(resolve_index(Some(45), Some(48), Some(50)), Some(50));
/// assert_eq!(resolve_index(None, None, None), None);
/// ```
pub fn resolve_index(
    durable: Option<usize>,
    cache: Option<usize>,
    engine: Option<usize>,
) -> Option<usize> {
    durable.max(cache).max(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_takes_max_of_sources() {
        assert_eq!(resolve_index(Some(45), Some(48), Some(50)), Some(50));
        assert_eq!(resolve_index(Some(45), None, None), Some(45));
        assert_eq!(resolve_index(None, Some(0), None), Some(0));
        assert_eq!(resolve_index(None, None, None), None);
    }

    #[test]
    fn wake_cycle_issues_session_and_opens_grace() {
        let mut wake = WakeCoordinator::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        let before = wake.current_session();

        let session = wake.begin_wake(t0);
        assert!(session > before);
        assert!(wake.is_transitioning());
        assert!(!wake.in_grace(t0));

        let t1 = t0 + Duration::from_millis(300);
        wake.complete_wake(t1);
        assert!(!wake.is_transitioning());
        assert!(wake.in_grace(t1 + Duration::from_millis(999)));
        assert!(!wake.in_grace(t1 + Duration::from_millis(1000)));
        assert_eq!(
            wake.time_since_transition(t1 + Duration::from_millis(250)),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn no_transition_means_no_grace() {
        let wake = WakeCoordinator::new(Duration::from_millis(1000));
        let now = Instant::now();
        assert_eq!(wake.time_since_transition(now), None);
        assert!(!wake.in_grace(now));
        assert_eq!(
            wake.snapshot(),
            WakeTransition {
                in_progress: false,
                grace_deadline: None
            }
        );
    }

    #[test]
    fn sessions_are_monotonic_across_sources() {
        let mut wake = WakeCoordinator::new(Duration::from_millis(10));
        let a = wake.open_session();
        let b = wake.begin_wake(Instant::now());
        let c = wake.open_session();
        assert!(a < b && b < c);
    }
}

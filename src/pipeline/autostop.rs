//! Sleep-timer style auto-stop.
//!
//! Armed when playback starts, disarmed when it stops.  The minutes mode is
//! polled with the event clock rather than a background timer, so it fires
//! on the first event after the deadline.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::{AutoStopConfig, AutoStopMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStopReason {
    Minutes,
    Paragraphs,
    Chapters,
}

impl fmt::Display for AutoStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minutes => "minutes",
            Self::Paragraphs => "paragraphs",
            Self::Chapters => "chapters",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AutoStop {
    config: AutoStopConfig,
    armed: bool,
    deadline: Option<Instant>,
    paragraphs_spoken: u32,
    chapters_finished: u32,
}

impl AutoStop {
    pub fn new(config: AutoStopConfig) -> Self {
        Self {
            config,
            armed: false,
            deadline: None,
            paragraphs_spoken: 0,
            chapters_finished: 0,
        }
    }

    fn enabled(&self) -> bool {
        self.config.mode != AutoStopMode::Off && self.config.amount > 0
    }

    /// Start counting from zero.  Re-arming restarts the minutes deadline.
    pub fn arm(&mut self, now: Instant) {
        self.paragraphs_spoken = 0;
        self.chapters_finished = 0;
        self.armed = self.enabled();
        self.deadline = (self.armed && self.config.mode == AutoStopMode::Minutes)
            .then(|| now + Duration::from_secs(u64::from(self.config.amount) * 60));
    }

    /// Arm only if not already counting (chapter hand-over keeps counters).
    pub fn ensure_armed(&mut self, now: Instant) {
        if !self.armed {
            self.arm(now);
        }
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.deadline = None;
        self.paragraphs_spoken = 0;
        self.chapters_finished = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn on_paragraph_completed(&mut self) -> Option<AutoStopReason> {
        if !self.armed || self.config.mode != AutoStopMode::Paragraphs {
            return None;
        }
        self.paragraphs_spoken += 1;
        (self.paragraphs_spoken >= self.config.amount).then(|| self.trigger(AutoStopReason::Paragraphs))
    }

    pub fn on_chapter_finished(&mut self) -> Option<AutoStopReason> {
        if !self.armed || self.config.mode != AutoStopMode::Chapters {
            return None;
        }
        self.chapters_finished += 1;
        (self.chapters_finished >= self.config.amount).then(|| self.trigger(AutoStopReason::Chapters))
    }

    pub fn check(&mut self, now: Instant) -> Option<AutoStopReason> {
        let deadline = self.deadline?;
        (self.armed && now >= deadline).then(|| self.trigger(AutoStopReason::Minutes))
    }

    fn trigger(&mut self, reason: AutoStopReason) -> AutoStopReason {
        log::info!("autostop: {reason} limit reached ({})", self.config.amount);
        self.disarm();
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auto_stop(mode: AutoStopMode, amount: u32) -> AutoStop {
        AutoStop::new(AutoStopConfig { mode, amount })
    }

    #[test]
    fn off_never_triggers() {
        let mut a = auto_stop(AutoStopMode::Off, 3);
        let now = Instant::now();
        a.arm(now);
        assert!(!a.is_armed());
        for _ in 0..10 {
            assert_eq!(a.on_paragraph_completed(), None);
        }
        assert_eq!(a.check(now + Duration::from_secs(86_400)), None);
    }

    #[test]
    fn paragraphs_trigger_once_at_amount() {
        let mut a = auto_stop(AutoStopMode::Paragraphs, 3);
        a.arm(Instant::now());

        assert_eq!(a.on_paragraph_completed(), None);
        assert_eq!(a.on_paragraph_completed(), None);
        assert_eq!(a.on_paragraph_completed(), Some(AutoStopReason::Paragraphs));
        assert!(!a.is_armed());
        assert_eq!(a.on_paragraph_completed(), None);
    }

    #[test]
    fn chapters_ignore_paragraphs() {
        let mut a = auto_stop(AutoStopMode::Chapters, 1);
        a.arm(Instant::now());

        assert_eq!(a.on_paragraph_completed(), None);
        assert_eq!(a.on_chapter_finished(), Some(AutoStopReason::Chapters));
    }

    #[test]
    fn minutes_fire_on_first_check_after_deadline() {
        let mut a = auto_stop(AutoStopMode::Minutes, 2);
        let t0 = Instant::now();
        a.arm(t0);

        assert_eq!(a.check(t0 + Duration::from_secs(119)), None);
        assert_eq!(a.check(t0 + Duration::from_secs(120)), Some(AutoStopReason::Minutes));
        assert_eq!(a.check(t0 + Duration::from_secs(500)), None);
    }

    #[test]
    fn ensure_armed_keeps_running_count() {
        let mut a = auto_stop(AutoStopMode::Paragraphs, 2);
        let now = Instant::now();
        a.arm(now);
        a.on_paragraph_completed();
        a.ensure_armed(now);
        assert_eq!(a.on_paragraph_completed(), Some(AutoStopReason::Paragraphs));
    }
}

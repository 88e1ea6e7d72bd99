//! Session boundaries: screen wake and chapter changes.

pub mod chapter;
pub mod wake;

pub use chapter::{
    ChapterConflict, ChapterOpen, ChapterTransitionHandler, InFlight, Resolution,
};
pub use wake::{resolve_index, WakeCoordinator, WakePhase, WakeTransition};

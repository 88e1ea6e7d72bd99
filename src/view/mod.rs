//! Document-view seam: inbound position messages and outbound highlight /
//! scroll commands.

pub mod message;

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

pub use message::{MessageError, ViewMessage};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ViewError {
    /// The view is not attached (e.g. page still loading).
    #[error("document view unavailable")]
    Unavailable,
}

/// Commands the core sends to the embedded document view.
#[async_trait]
pub trait DocumentView: Send + Sync {
    async fn highlight_paragraph(&self, index: usize) -> Result<(), ViewError>;
    async fn scroll_to(&self, index: usize) -> Result<(), ViewError>;
}

// Compile-time assertion: Box<dyn DocumentView> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn DocumentView>) {}
};

// ---------------------------------------------------------------------------
// RecordingView
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    Highlight(usize),
    Scroll(usize),
}

/// Records every command it receives.  Used by tests and the simulator.
#[derive(Debug, Default)]
pub struct RecordingView {
    commands: Mutex<Vec<ViewCommand>>,
}

impl RecordingView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ViewCommand> {
        self.lock().clone()
    }

    pub fn last_highlight(&self) -> Option<usize> {
        self.lock().iter().rev().find_map(|c| match c {
            ViewCommand::Highlight(i) => Some(*i),
            ViewCommand::Scroll(_) => None,
        })
    }

    fn push(&self, command: ViewCommand) {
        log::debug!("view: {command:?}");
        self.lock().push(command);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ViewCommand>> {
        match self.commands.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl DocumentView for RecordingView {
    async fn highlight_paragraph(&self, index: usize) -> Result<(), ViewError> {
        self.push(ViewCommand::Highlight(index));
        Ok(())
    }

    async fn scroll_to(&self, index: usize) -> Result<(), ViewError> {
        self.push(ViewCommand::Scroll(index));
        Ok(())
    }
}

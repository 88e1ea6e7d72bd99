//! Speech-engine seam.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              SpeechEngine (trait)             │
//! │                                               │
//! │  append_to_queue(texts, ids) → bool | Err     │
//! │  speak_now(texts, ids)       → count | Err    │
//! │  queue_depth()               → usize | Err    │
//! │  stop()                                       │
//! └──────────────┬────────────────────────────────┘
//!                │ EngineEvent (Started / Completed / QueueEmpty)
//!                ▼
//!        SyncOrchestrator event loop
//! ```
//!
//! The platform engine is external.  [`SimulatedEngine`] is an in-process
//! stand-in with failure injection used by the tests and the simulator
//! binary.

pub mod sim;

use async_trait::async_trait;
use thiserror::Error;

pub use sim::SimulatedEngine;

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Failures reported by a speech engine call.  All of them are treated as
/// transient by the refill controller.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The engine refused the request (e.g. its service is rebinding).
    #[error("speech engine rejected the request: {0}")]
    Rejected(String),

    /// The engine is not bound / not initialised.
    #[error("speech engine unavailable")]
    Unavailable,

    /// Anything else surfaced by the platform bridge.
    #[error("speech engine error: {0}")]
    Internal(String),
}

// ---------------------------------------------------------------------------
// SpeechEngine trait
// ---------------------------------------------------------------------------

/// Async interface to the platform speech engine.
///
/// Implementors must be `Send + Sync` so they can be shared behind an
/// `Arc<dyn SpeechEngine>`.
///
/// `texts` and `ids` are always the same length; `ids[i]` is the utterance id
/// for `texts[i]`.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Append to the engine's playback queue without interrupting it.
    /// `Ok(false)` means the engine declined without raising an error.
    async fn append_to_queue(&self, texts: &[String], ids: &[String])
        -> Result<bool, EngineError>;

    /// Flush the engine's queue and start speaking `texts` immediately.
    /// Returns the number of utterances accepted.
    async fn speak_now(&self, texts: &[String], ids: &[String]) -> Result<usize, EngineError>;

    /// Number of utterances still waiting in the engine's own queue.
    async fn queue_depth(&self) -> Result<usize, EngineError>;

    /// Stop speaking and clear the engine's queue.
    async fn stop(&self) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// EngineEvent
// ---------------------------------------------------------------------------

/// Events delivered asynchronously by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Audio for the utterance began.  Never moves the completed index.
    Started(String),
    /// Audio for the utterance finished.
    Completed(String),
    /// The engine's queue drained completely.
    QueueEmpty,
}

// Compile-time assertion: Box<dyn SpeechEngine> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SpeechEngine>) {}
};

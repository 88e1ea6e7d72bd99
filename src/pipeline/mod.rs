//! Orchestration of the read-aloud sync core.
//!
//! This module wires the speech engine, document view and progress stores to
//! the tracking components, and exposes the shared state hosts read to render
//! playback controls.
//!
//! # Architecture
//!
//! ```text
//! SyncEvent (mpsc) ◀── engine callbacks, view messages, screen power, UI
//!        │
//!        ▼
//! SyncOrchestrator::run()  ← async tokio task
//!        │
//!        ├─ stale-event filter  → PositionTracker     (view reports)
//!        ├─ PositionTracker     → ProgressStore x2    (completions)
//!        ├─ RefillController    → SpeechEngine        (low watermark)
//!        ├─ WakeCoordinator     → new session, restart (screen on)
//!        ├─ ChapterTransitionHandler                   (open / finish)
//!        └─ AutoStop                                   (sleep timer)
//!
//! SyncNotice (mpsc) ──▶ host UI
//! SharedState (Arc<Mutex<ReaderState>>) ◀── polled by the host
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use tts_sync::config::AppConfig;
//! use tts_sync::engine::SimulatedEngine;
//! use tts_sync::pipeline::{SyncEvent, SyncOrchestrator};
//! use tts_sync::store::{JsonFileStore, MemoryStore};
//! use tts_sync::view::RecordingView;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let durable = Arc::new(JsonFileStore::new(config.progress_file()));
//!
//!     let (notice_tx, mut notice_rx) = mpsc::channel(16);
//!     let orchestrator = SyncOrchestrator::new(
//!         config,
//!         Arc::new(SimulatedEngine::new()),
//!         Arc::new(RecordingView::new()),
//!         durable,
//!         Arc::new(MemoryStore::new()),
//!         notice_tx,
//!     );
//!     let state = orchestrator.shared_state();
//!
//!     let (event_tx, event_rx) = mpsc::channel(64);
//!     tokio::spawn(orchestrator.run(event_rx));
//!
//!     // Engine callbacks are forwarded as `SyncEvent::from(EngineEvent)`.
//!     # let _ = (event_tx, state);
//!     while let Some(notice) = notice_rx.recv().await {
//!         println!("{notice:?}");
//!     }
//! }
//! ```

pub mod autostop;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use autostop::{AutoStop, AutoStopReason};
pub use runner::{SyncEvent, SyncNotice, SyncOrchestrator};
pub use state::{new_shared_state, PlaybackPhase, ReaderState, SharedState};

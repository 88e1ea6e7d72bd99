//! Paragraph-position sync core for a read-aloud reader.
//!
//! Keeps a speech engine's utterance queue, an embedded document view and
//! persisted reading progress agreeing on which paragraph is being read,
//! across screen-off/on cycles, chapter changes and stale view reports.
//!
//! Start with [`pipeline::SyncOrchestrator`].

pub mod config;
pub mod engine;
pub mod pipeline;
pub mod position;
pub mod queue;
pub mod ratelog;
pub mod session;
pub mod store;
pub mod transition;
pub mod view;

//! Session model shared by every component.
//!
//! Nothing here holds mutable cross-component state: identifiers, immutable
//! [`PlaybackSession`] records, position snapshots and the utterance-id wire
//! format.

pub mod types;
pub mod utterance;

pub use types::{ChapterId, PlaybackPosition, PlaybackSession, SessionId};
pub use utterance::{UtteranceId, UtteranceRef};

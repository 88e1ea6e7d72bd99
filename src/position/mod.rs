//! Where we are: the authoritative completed-paragraph tracker and the filter
//! that decides which document-view reports may influence it.

pub mod filter;
pub mod tracker;

pub use filter::{classify, should_ignore, FilterContext, FilterVerdict, PositionReport};
pub use tracker::{CompletionOutcome, PositionTracker};

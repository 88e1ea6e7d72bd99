//! Engine queue management: batch construction, the enqueued window and
//! the refill controller.

pub mod batch;
pub mod refill;
pub mod window;

pub use batch::{build_batch, build_batch_limited, clamp_paragraph_index, Batch};
pub use refill::{RefillController, RefillOutcome};
pub use window::QueueWindow;

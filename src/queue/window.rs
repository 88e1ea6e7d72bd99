//! The span of paragraphs currently handed to the speech engine.

use super::batch::Batch;

/// Paragraphs enqueued with the engine during the current session and not
/// yet completed.
///
/// Only the index range is kept; the texts live in the session.  Never
/// patched in place: every refill or completion produces a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueWindow {
    start_index: usize,
    end_index: usize,
}

impl QueueWindow {
    pub fn from_batch(batch: &Batch) -> Self {
        Self {
            start_index: batch.start_index,
            end_index: batch.end_index(),
        }
    }

    /// A new window covering `self` followed by `batch`.
    ///
    /// If the batch does not continue where this window ends, the window
    /// restarts at the batch.
    pub fn extended(&self, batch: &Batch) -> Self {
        if batch.start_index != self.end_index {
            return Self::from_batch(batch);
        }
        Self {
            start_index: self.start_index,
            end_index: batch.end_index(),
        }
    }

    /// The window without paragraphs up to and including `last_completed`.
    pub fn retired_through(&self, last_completed: usize) -> Self {
        let start = self.start_index.max(last_completed + 1).min(self.end_index);
        Self {
            start_index: start,
            end_index: self.end_index,
        }
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// One past the last enqueued paragraph.
    pub fn end_index(&self) -> usize {
        self.end_index
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start_index..self.end_index).contains(&index)
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::batch::build_batch_limited;
    use crate::session::ChapterId;

    fn paragraphs() -> Vec<String> {
        (0..10).map(|i| format!("p{i}")).collect()
    }

    #[test]
    fn extended_window_is_contiguous() {
        let chapter = ChapterId::from(3);
        let ps = paragraphs();

        let first = QueueWindow::from_batch(&build_batch_limited(&chapter, &ps, Some(2), 3));
        let second = first.extended(&build_batch_limited(&chapter, &ps, Some(5), 3));

        assert_eq!(first.end_index(), 5);
        assert_eq!(second.start_index(), 2);
        assert_eq!(second.end_index(), 8);
        assert!(second.contains(7));
        assert!(!second.contains(8));
    }

    #[test]
    fn discontinuous_batch_restarts_window() {
        let chapter = ChapterId::from(3);
        let ps = paragraphs();

        let first = QueueWindow::from_batch(&build_batch_limited(&chapter, &ps, Some(0), 3));
        let jumped = first.extended(&build_batch_limited(&chapter, &ps, Some(6), 2));

        assert_eq!(jumped.start_index(), 6);
        assert_eq!(jumped.len(), 2);
    }

    #[test]
    fn completed_paragraphs_leave_the_window() {
        let chapter = ChapterId::from(3);
        let window = QueueWindow::from_batch(&build_batch_limited(&chapter, &paragraphs(), Some(2), 5));

        let retired = window.retired_through(3);
        assert_eq!((retired.start_index(), retired.end_index()), (4, 7));
        assert!(!retired.contains(3));

        // Behind the window: unchanged.
        assert_eq!(window.retired_through(0), window);

        // Past the end: empty, and still extendable from where it ended.
        let drained = window.retired_through(9);
        assert!(drained.is_empty());
        let refilled = drained.extended(&build_batch_limited(&chapter, &paragraphs(), Some(7), 2));
        assert_eq!((refilled.start_index(), refilled.end_index()), (7, 9));
    }
}

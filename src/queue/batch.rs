//! Pure batch construction.
//!
//! [`build_batch`] turns a chapter's paragraph list plus a start index into
//! the texts/ids pair the speech engine expects.  No I/O, no state.

use crate::session::{ChapterId, UtteranceId};

/// A slice of paragraphs ready to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    /// Absolute index of `texts[0]` within the chapter.
    pub start_index: usize,
    pub texts: Vec<String>,
    /// `chapter_<id>_utterance_<start_index + i>` for each text.
    pub utterance_ids: Vec<String>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Absolute index one past the last paragraph in the batch.
    pub fn end_index(&self) -> usize {
        self.start_index + self.texts.len()
    }
}

/// Build a batch of every paragraph from `start_index` to the end.
///
/// Negative or missing start indices clamp to 0; a start past the end yields
/// an empty batch (the `start_index` is still reported as requested).
///
/// ```
/// use tts_sync::queue::build_batch;
/// use tts_sync::session::ChapterId;
///
/// let paragraphs: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
/// let batch = build_batch(&ChapterId::from("X"), &paragraphs, Some(2));
///
/// assert_eq!(batch.start_index, 2);
/// assert_eq!(batch.texts, vec!["c", "d"]);
/// assert_eq!(batch.utterance_ids, vec!["chapter_X_utterance_2", "chapter_X_utterance_3"]);
/// ```
pub fn build_batch(chapter: &ChapterId, paragraphs: &[String], start_index: Option<i64>) -> Batch {
    build_batch_limited(chapter, paragraphs, start_index, usize::MAX)
}

/// Like [`build_batch`] but takes at most `limit` paragraphs.
pub fn build_batch_limited(
    chapter: &ChapterId,
    paragraphs: &[String],
    start_index: Option<i64>,
    limit: usize,
) -> Batch {
    let start = start_index.map_or(0, |i| i.max(0) as usize);

    let texts: Vec<String> = paragraphs
        .iter()
        .skip(start)
        .take(limit)
        .cloned()
        .collect();

    let utterance_ids = (start..start + texts.len())
        .map(|i| UtteranceId::new(chapter, i).into_string())
        .collect();

    Batch {
        start_index: start,
        texts,
        utterance_ids,
    }
}

/// Clamp a resume index into `[0, total - 1]`.
///
/// Persisted indices can outlive the chapter text they were recorded
/// against (chapter re-downloaded, extraction rules changed), so anything
/// past the end is pulled back to the last paragraph with a warning.
pub fn clamp_paragraph_index(index: i64, total: usize) -> usize {
    if total == 0 {
        log::warn!("batch: no paragraphs available, clamping index {index} to 0");
        return 0;
    }
    if index < 0 {
        return 0;
    }
    let max_valid = total - 1;
    let index = index as usize;
    if index > max_valid {
        log::warn!("batch: index {index} exceeds available paragraphs (max {max_valid}), clamping");
        return max_valid;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraphs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn slices_from_start_index() {
        let batch = build_batch(&ChapterId::from("X"), &paragraphs(&["a", "b", "c", "d"]), Some(2));
        assert_eq!(batch.start_index, 2);
        assert_eq!(batch.texts, paragraphs(&["c", "d"]));
        assert_eq!(
            batch.utterance_ids,
            paragraphs(&["chapter_X_utterance_2", "chapter_X_utterance_3"])
        );
    }

    #[test]
    fn start_past_end_is_empty() {
        let batch = build_batch(&ChapterId::from("X"), &paragraphs(&["a", "b"]), Some(10));
        assert!(batch.texts.is_empty());
        assert!(batch.utterance_ids.is_empty());
    }

    #[test]
    fn negative_or_missing_start_clamps_to_zero() {
        let ps = paragraphs(&["a", "b"]);
        let neg = build_batch(&ChapterId::from("X"), &ps, Some(-3));
        let missing = build_batch(&ChapterId::from("X"), &ps, None);

        assert_eq!(neg.start_index, 0);
        assert_eq!(neg, missing);
        assert_eq!(neg.utterance_ids[0], "chapter_X_utterance_0");
    }

    #[test]
    fn limit_caps_batch_length() {
        let ps: Vec<String> = (0..40).map(|i| format!("p{i}")).collect();
        let batch = build_batch_limited(&ChapterId::from(1), &ps, Some(30), 25);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.end_index(), 40);

        let batch = build_batch_limited(&ChapterId::from(1), &ps, Some(0), 25);
        assert_eq!(batch.len(), 25);
        assert_eq!(batch.utterance_ids[24], "chapter_1_utterance_24");
    }

    #[test]
    fn clamp_keeps_index_in_range() {
        assert_eq!(clamp_paragraph_index(5, 10), 5);
        assert_eq!(clamp_paragraph_index(-1, 10), 0);
        assert_eq!(clamp_paragraph_index(2000, 10), 9);
        assert_eq!(clamp_paragraph_index(3, 0), 0);
    }
}

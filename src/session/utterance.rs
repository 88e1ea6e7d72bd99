//! Utterance identifiers, the wire contract with the speech engine.
//!
//! Every queued paragraph is tagged `chapter_<chapterId>_utterance_<index>`
//! where `index` is the absolute paragraph index within the chapter.
//! Completion events echo the id back, so the tracker can recover both the
//! chapter and the paragraph without any lookup table.
//!
//! Changing the format requires changing [`UtteranceId::parse`] in lockstep.

use std::fmt;

use super::types::ChapterId;

const CHAPTER_PREFIX: &str = "chapter_";
const UTTERANCE_MARKER: &str = "_utterance_";
const BARE_PREFIX: &str = "utterance_";

/// Formatted utterance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UtteranceId(String);

/// Decoded form of an utterance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceRef {
    /// `None` for bare `utterance_<n>` ids that carry no chapter.
    pub chapter: Option<ChapterId>,
    pub index: usize,
}

impl UtteranceId {
    /// ```
    /// use tts_sync::session::{ChapterId, UtteranceId};
    ///
    /// let id = UtteranceId::new(&ChapterId::from(42), 7);
    /// assert_eq!(id.as_str(), "chapter_42_utterance_7");
    /// ```
    pub fn new(chapter: &ChapterId, index: usize) -> Self {
        Self(format!("{CHAPTER_PREFIX}{chapter}{UTTERANCE_MARKER}{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Parse a raw id string.
    ///
    /// The chapter part is everything between `chapter_` and the *last*
    /// `_utterance_`, so opaque chapter ids containing underscores survive.
    /// Returns `None` for anything that does not end in a decimal index.
    pub fn parse(raw: &str) -> Option<UtteranceRef> {
        if let Some(rest) = raw.strip_prefix(CHAPTER_PREFIX) {
            let split = rest.rfind(UTTERANCE_MARKER)?;
            let chapter = &rest[..split];
            let index = parse_index(&rest[split + UTTERANCE_MARKER.len()..])?;
            if chapter.is_empty() {
                return None;
            }
            return Some(UtteranceRef {
                chapter: Some(ChapterId::from(chapter)),
                index,
            });
        }

        let index = parse_index(raw.strip_prefix(BARE_PREFIX)?)?;
        Some(UtteranceRef {
            chapter: None,
            index,
        })
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_index(digits: &str) -> Option<usize> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chapter_and_index() {
        let parsed = UtteranceId::parse("chapter_12_utterance_40").unwrap();
        assert_eq!(parsed.chapter, Some(ChapterId::from(12)));
        assert_eq!(parsed.index, 40);
    }

    #[test]
    fn formatted_id_parses_back() {
        let chapter = ChapterId::from("vol_2_ch_9");
        let id = UtteranceId::new(&chapter, 3);
        let parsed = UtteranceId::parse(id.as_str()).unwrap();
        assert_eq!(parsed.chapter, Some(chapter));
        assert_eq!(parsed.index, 3);
    }

    #[test]
    fn bare_utterance_has_no_chapter() {
        let parsed = UtteranceId::parse("utterance_5").unwrap();
        assert_eq!(parsed.chapter, None);
        assert_eq!(parsed.index, 5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(UtteranceId::parse("").is_none());
        assert!(UtteranceId::parse("1699999999999").is_none());
        assert!(UtteranceId::parse("chapter_3_utterance_").is_none());
        assert!(UtteranceId::parse("chapter_3_utterance_-1").is_none());
        assert!(UtteranceId::parse("chapter__utterance_2").is_none());
        assert!(UtteranceId::parse("chapter_3_paragraph_2").is_none());
    }
}

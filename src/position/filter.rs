//! Stale-event filter for document-view position reports.
//!
//! The document view reports positions asynchronously, and around a wake or
//! chapter change it routinely reports positions that belong to the previous
//! state: its own scroll restore, a queued message from before the screen
//! went off, a freshly reloaded page claiming paragraph 0.  [`classify`]
//! decides whether a report can be trusted; it is pure and ordered:
//!
//! | # | Condition                                                     | Verdict              |
//! |---|---------------------------------------------------------------|----------------------|
//! | 1 | report names a chapter other than the current one             | `ChapterMismatch`    |
//! | 2 | inside grace, report names no chapter                         | `UnattributedInGrace`|
//! | 3 | inside grace, index below the latest known index              | `RegressionInGrace`  |
//! | 4 | inside grace, index 0 while current/latest is past 0          | `ResetInGrace`       |
//! | 5 | anything else                                                 | `Accept`             |

use std::time::Duration;

use crate::session::ChapterId;

/// A position claim from the document view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionReport {
    pub chapter: Option<ChapterId>,
    pub index: usize,
    /// Sender-side timestamp in milliseconds, informational only.
    pub timestamp: Option<u64>,
}

impl PositionReport {
    pub fn new(chapter: Option<ChapterId>, index: usize) -> Self {
        Self {
            chapter,
            index,
            timestamp: None,
        }
    }
}

/// What the core currently believes, as seen by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterContext {
    pub current_chapter: ChapterId,
    /// Highest index accepted from any source this session.
    pub latest_known_index: Option<usize>,
    /// Paragraph currently considered active.
    pub current_index: Option<usize>,
    /// `None` when no transition has happened yet.
    pub time_since_transition: Option<Duration>,
    pub grace: Duration,
}

impl FilterContext {
    fn in_grace(&self) -> bool {
        self.time_since_transition
            .is_some_and(|elapsed| elapsed < self.grace)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    ChapterMismatch,
    UnattributedInGrace,
    RegressionInGrace,
    ResetInGrace,
}

impl FilterVerdict {
    pub fn is_ignored(self) -> bool {
        self != Self::Accept
    }

    /// Short stable label, used as the rate-limit key for drop logs.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Accept => "accepted",
            Self::ChapterMismatch => "chapter mismatch",
            Self::UnattributedInGrace => "no chapter during grace",
            Self::RegressionInGrace => "regression during grace",
            Self::ResetInGrace => "reset to 0 during grace",
        }
    }
}

pub fn classify(report: &PositionReport, ctx: &FilterContext) -> FilterVerdict {
    if report
        .chapter
        .as_ref()
        .is_some_and(|c| *c != ctx.current_chapter)
    {
        return FilterVerdict::ChapterMismatch;
    }

    if !ctx.in_grace() {
        return FilterVerdict::Accept;
    }

    if report.chapter.is_none() {
        return FilterVerdict::UnattributedInGrace;
    }
    if ctx.latest_known_index.is_some_and(|latest| report.index < latest) {
        return FilterVerdict::RegressionInGrace;
    }
    let known = ctx.current_index.max(ctx.latest_known_index);
    if report.index == 0 && known.is_some_and(|k| k > 0) {
        return FilterVerdict::ResetInGrace;
    }

    FilterVerdict::Accept
}

pub fn should_ignore(report: &PositionReport, ctx: &FilterContext) -> bool {
    classify(report, ctx).is_ignored()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(latest: Option<usize>, current: Option<usize>, since_ms: Option<u64>) -> FilterContext {
        FilterContext {
            current_chapter: ChapterId::from(5),
            latest_known_index: latest,
            current_index: current,
            time_since_transition: since_ms.map(Duration::from_millis),
            grace: Duration::from_millis(1000),
        }
    }

    fn report(chapter: Option<i64>, index: usize) -> PositionReport {
        PositionReport::new(chapter.map(ChapterId::from), index)
    }

    #[test]
    fn foreign_chapter_ignored_outside_grace() {
        let c = ctx(Some(10), Some(10), Some(5000));
        assert_eq!(classify(&report(Some(4), 10), &c), FilterVerdict::ChapterMismatch);
        assert!(should_ignore(&report(Some(4), 10), &c));
    }

    #[test]
    fn regression_ignored_inside_grace() {
        let c = ctx(Some(10), Some(10), Some(200));
        assert_eq!(classify(&report(Some(5), 8), &c), FilterVerdict::RegressionInGrace);
    }

    #[test]
    fn reset_to_zero_ignored_inside_grace() {
        let c = ctx(Some(10), Some(10), Some(200));
        assert_eq!(classify(&report(Some(5), 0), &c), FilterVerdict::ResetInGrace);

        // Only the current index needs to be past zero.
        let c = ctx(None, Some(3), Some(200));
        assert_eq!(classify(&report(Some(5), 0), &c), FilterVerdict::ResetInGrace);
    }

    #[test]
    fn regression_accepted_after_grace() {
        let c = ctx(Some(10), Some(10), Some(1500));
        assert_eq!(classify(&report(Some(5), 8), &c), FilterVerdict::Accept);
        assert!(!should_ignore(&report(Some(5), 0), &c));
    }

    #[test]
    fn unattributed_report_only_ignored_inside_grace() {
        assert_eq!(
            classify(&report(None, 12), &ctx(Some(10), None, Some(100))),
            FilterVerdict::UnattributedInGrace
        );
        assert_eq!(
            classify(&report(None, 12), &ctx(Some(10), None, Some(1000))),
            FilterVerdict::Accept
        );
    }

    #[test]
    fn no_transition_yet_counts_as_outside_grace() {
        let c = ctx(Some(10), Some(10), None);
        assert_eq!(classify(&report(None, 2), &c), FilterVerdict::Accept);
    }

    #[test]
    fn forward_report_accepted_inside_grace() {
        let c = ctx(Some(10), Some(10), Some(10));
        assert_eq!(classify(&report(Some(5), 10), &c), FilterVerdict::Accept);
        assert_eq!(classify(&report(Some(5), 14), &c), FilterVerdict::Accept);
    }

    #[test]
    fn zero_accepted_on_fresh_chapter_inside_grace() {
        let c = ctx(None, None, Some(10));
        assert_eq!(classify(&report(Some(5), 0), &c), FilterVerdict::Accept);
    }
}

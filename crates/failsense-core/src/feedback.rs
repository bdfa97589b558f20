//! Single-slot outcome tracking for suggested fixes.
//!
//! An item remembers at most one fix that worked. A positive judgment moves the
//! slot to that fix; any negative judgment empties it, whichever fix was judged.

use serde::{Deserialize, Serialize};

use crate::{AnalysisResult, CoreError, FixFeedback, HistoryItem};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "state", content = "fix_index", rename_all = "snake_case")]
pub enum FeedbackMark {
    Unmarked,
    MarkedWorking(usize),
}

impl FeedbackMark {
    #[must_use]
    pub fn of(item: &HistoryItem) -> Self {
        match item.worked_fix_index {
            Some(index) => Self::MarkedWorking(index),
            None => Self::Unmarked,
        }
    }

    #[must_use]
    pub fn worked_fix_index(self) -> Option<usize> {
        match self {
            Self::Unmarked => None,
            Self::MarkedWorking(index) => Some(index),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct FeedbackTransition {
    pub before: FeedbackMark,
    pub after: FeedbackMark,
}

impl FeedbackTransition {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Apply one judgment to `item`.
///
/// # Errors
/// Returns [`CoreError::Validation`] when `worked` is set and `fix_index` does
/// not address one of the item's fixes. The item is left untouched.
pub fn apply_feedback(
    item: &mut HistoryItem,
    fix_index: usize,
    worked: bool,
) -> Result<FeedbackTransition, CoreError> {
    let before = FeedbackMark::of(item);

    let after = if worked {
        if fix_index >= item.result.fixes.len() {
            return Err(CoreError::Validation(format!(
                "fix index {fix_index} is out of range for {} fixes",
                item.result.fixes.len()
            )));
        }
        FeedbackMark::MarkedWorking(fix_index)
    } else {
        FeedbackMark::Unmarked
    };

    item.worked_fix_index = after.worked_fix_index();
    Ok(FeedbackTransition { before, after })
}

/// Presentation copy of `result` where only the judged fix carries an outcome.
///
/// An out-of-range `fix_index` yields a copy with every fix unset.
#[must_use]
pub fn annotate_fixes(result: &AnalysisResult, fix_index: usize, worked: bool) -> AnalysisResult {
    let outcome = if worked { FixFeedback::Worked } else { FixFeedback::Failed };
    let mut annotated = result.clone();
    for (index, fix) in annotated.fixes.iter_mut().enumerate() {
        fix.feedback = (index == fix_index).then_some(outcome);
    }
    annotated
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::fixtures::{mk_item, FIXTURE_NOW};

    #[test]
    fn worked_marks_the_judged_fix() {
        let mut item = mk_item("a", "runtime", FIXTURE_NOW, &[]);
        let transition = apply_feedback(&mut item, 2, true)
            .unwrap_or_else(|err| panic!("feedback should apply: {err}"));

        assert_eq!(item.worked_fix_index, Some(2));
        assert_eq!(transition.before, FeedbackMark::Unmarked);
        assert_eq!(transition.after, FeedbackMark::MarkedWorking(2));
        assert!(transition.changed());
    }

    #[test]
    fn failed_resets_slot_regardless_of_index() {
        let mut item = mk_item("a", "runtime", FIXTURE_NOW, &[]);
        apply_feedback(&mut item, 2, true)
            .unwrap_or_else(|err| panic!("feedback should apply: {err}"));

        let transition = apply_feedback(&mut item, 0, false)
            .unwrap_or_else(|err| panic!("feedback should apply: {err}"));

        assert_eq!(item.worked_fix_index, None);
        assert_eq!(transition.before, FeedbackMark::MarkedWorking(2));
        assert_eq!(transition.after, FeedbackMark::Unmarked);
    }

    #[test]
    fn failed_on_unmarked_item_is_unchanged() {
        let mut item = mk_item("a", "runtime", FIXTURE_NOW, &[]);
        let transition = apply_feedback(&mut item, 7, false)
            .unwrap_or_else(|err| panic!("feedback should apply: {err}"));
        assert!(!transition.changed());
        assert_eq!(item.worked_fix_index, None);
    }

    #[test]
    fn worked_with_out_of_range_index_is_rejected_without_mutation() {
        let mut item = mk_item("a", "runtime", FIXTURE_NOW, &[]);
        item.worked_fix_index = Some(1);

        let result = apply_feedback(&mut item, 3, true);
        assert!(matches!(result, Err(CoreError::Validation(_))));
        assert_eq!(item.worked_fix_index, Some(1));
    }

    #[test]
    fn annotate_sets_only_judged_fix() {
        let mut item = mk_item("a", "runtime", FIXTURE_NOW, &[]);
        item.result.fixes[0].feedback = Some(FixFeedback::Worked);

        let annotated = annotate_fixes(&item.result, 1, false);
        let marks = annotated.fixes.iter().map(|fix| fix.feedback).collect::<Vec<_>>();
        assert_eq!(marks, vec![None, Some(FixFeedback::Failed), None]);

        let annotated = annotate_fixes(&item.result, 2, true);
        let marks = annotated.fixes.iter().map(|fix| fix.feedback).collect::<Vec<_>>();
        assert_eq!(marks, vec![None, None, Some(FixFeedback::Worked)]);
    }

    proptest! {
        #[test]
        fn property_slot_tracks_last_judgment(
            judgments in proptest::collection::vec((0_usize..3, any::<bool>()), 1..20),
        ) {
            let mut item = mk_item("a", "runtime", FIXTURE_NOW, &[]);
            for (index, worked) in &judgments {
                let applied = apply_feedback(&mut item, *index, *worked);
                prop_assert!(applied.is_ok());
            }

            let (last_index, last_worked) = judgments[judgments.len() - 1];
            let expected = if last_worked { Some(last_index) } else { None };
            prop_assert_eq!(item.worked_fix_index, expected);
            prop_assert!(item.validate().is_ok());
        }
    }
}

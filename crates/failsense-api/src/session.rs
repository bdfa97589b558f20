use failsense_core::{annotate_fixes, AnalysisResult, HistoryId, HistoryItem};

/// Presentation state of the analysis currently on screen.
///
/// Fix annotations live only here; the store keeps the single worked-fix slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    current_id: Option<HistoryId>,
    current: Option<AnalysisResult>,
    pending_tags: Vec<String>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show `item`, seeding annotations from its stored worked fix.
    pub fn load(&mut self, item: &HistoryItem) {
        let result = match item.worked_fix_index {
            Some(index) => annotate_fixes(&item.result, index, true),
            None => item.result.clone(),
        };
        self.current_id = Some(item.id.clone());
        self.current = Some(result);
    }

    #[must_use]
    pub fn current_id(&self) -> Option<&HistoryId> {
        self.current_id.as_ref()
    }

    #[must_use]
    pub fn current_result(&self) -> Option<&AnalysisResult> {
        self.current.as_ref()
    }

    pub(crate) fn is_showing(&self, id: &HistoryId) -> bool {
        self.current_id.as_ref() == Some(id)
    }

    pub(crate) fn annotate(&mut self, fix_index: usize, worked: bool) {
        if let Some(result) = &self.current {
            self.current = Some(annotate_fixes(result, fix_index, worked));
        }
    }

    /// Drop the displayed analysis, keeping pending tags.
    pub fn unload(&mut self) {
        self.current_id = None;
        self.current = None;
    }

    #[must_use]
    pub fn pending_tags(&self) -> &[String] {
        &self.pending_tags
    }

    /// Queue a tag for the next analysis. Blank and repeated tags are ignored.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.pending_tags.iter().any(|existing| existing == tag) {
            return false;
        }
        self.pending_tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.pending_tags.len();
        self.pending_tags.retain(|existing| existing != tag);
        self.pending_tags.len() != before
    }

    pub fn clear_tags(&mut self) {
        self.pending_tags.clear();
    }
}

#[cfg(test)]
mod tests {
    use failsense_core::{Fix, FixFeedback};

    use super::*;

    fn mk_item(worked_fix_index: Option<usize>) -> HistoryItem {
        HistoryItem {
            id: HistoryId::from("current"),
            timestamp: 0,
            code: "NullPointerException".to_string(),
            result: AnalysisResult {
                root_cause: "field read before initialization".to_string(),
                error_type: "runtime".to_string(),
                fixes: vec![
                    Fix {
                        fix: "Initialize in constructor".to_string(),
                        confidence: 0.9,
                        explanation: String::new(),
                        feedback: None,
                    },
                    Fix {
                        fix: "Use Optional".to_string(),
                        confidence: 0.6,
                        explanation: String::new(),
                        feedback: None,
                    },
                ],
                explanation: String::new(),
            },
            language: "java".to_string(),
            worked_fix_index,
            tags: None,
        }
    }

    fn marks(session: &Session) -> Vec<Option<FixFeedback>> {
        session
            .current_result()
            .map(|result| result.fixes.iter().map(|fix| fix.feedback).collect())
            .unwrap_or_default()
    }

    #[test]
    fn load_reflects_stored_worked_fix() {
        let mut session = Session::new();
        session.load(&mk_item(Some(1)));
        assert_eq!(marks(&session), vec![None, Some(FixFeedback::Worked)]);
        assert!(session.is_showing(&HistoryId::from("current")));
    }

    #[test]
    fn annotate_replaces_previous_marks() {
        let mut session = Session::new();
        session.load(&mk_item(Some(1)));
        session.annotate(0, false);
        assert_eq!(marks(&session), vec![Some(FixFeedback::Failed), None]);
    }

    #[test]
    fn pending_tags_are_trimmed_and_unique() {
        let mut session = Session::new();
        assert!(session.add_tag(" backend "));
        assert!(!session.add_tag("backend"));
        assert!(!session.add_tag("   "));
        assert!(session.add_tag("Backend"));
        assert_eq!(session.pending_tags(), ["backend".to_string(), "Backend".to_string()]);

        assert!(session.remove_tag("backend"));
        assert!(!session.remove_tag("backend"));
        session.clear_tags();
        assert!(session.pending_tags().is_empty());
    }

    #[test]
    fn unload_keeps_tags() {
        let mut session = Session::new();
        session.add_tag("ops");
        session.load(&mk_item(None));
        session.unload();
        assert!(session.current_result().is_none());
        assert_eq!(session.pending_tags().len(), 1);
    }
}

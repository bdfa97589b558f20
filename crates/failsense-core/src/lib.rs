use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

pub mod feedback;
pub mod preferences;
pub mod query;
pub mod render;

pub use feedback::{annotate_fixes, apply_feedback, FeedbackMark, FeedbackTransition};
pub use preferences::{ExportFormat, Preferences, SUPPORTED_LANGUAGES};
pub use query::{
    build_view, derive_facets, filter_history, DateRange, HistoryFacets, HistoryFilter,
    HistoryView,
};
pub use render::{code_preview, relative_age, render_item, HistorySummary};

pub const DEFAULT_HISTORY_LIMIT: usize = 20;
pub const MIN_HISTORY_LIMIT: usize = 1;
pub const MAX_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
}

/// Stable identity of one stored analysis.
///
/// Fresh ids are ULIDs. Any non-blank string is accepted when reading a
/// persisted blob, so histories written with epoch-millisecond ids still load.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct HistoryId(pub String);

impl HistoryId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for HistoryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HistoryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FixFeedback {
    Worked,
    Failed,
}

impl FixFeedback {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worked => "worked",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fix {
    pub fix: String,
    pub confidence: f64,
    pub explanation: String,
    /// Presentation-only outcome for the currently displayed result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FixFeedback>,
}

/// Diagnosis produced by the external analyzer. `fixes[0]` is the highest
/// ranked suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub root_cause: String,
    pub error_type: String,
    #[serde(default)]
    pub fixes: Vec<Fix>,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryItem {
    pub id: HistoryId,
    pub timestamp: i64,
    pub code: String,
    pub result: AnalysisResult,
    pub language: String,
    #[serde(rename = "workedFixIndex", default)]
    pub worked_fix_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl HistoryItem {
    /// Wrap a fresh analysis result into a record ready to be appended.
    #[must_use]
    pub fn new(
        code: impl Into<String>,
        language: impl Into<String>,
        result: AnalysisResult,
        tags: &[String],
        timestamp: i64,
    ) -> Self {
        Self {
            id: HistoryId::generate(),
            timestamp,
            code: code.into(),
            result,
            language: language.into(),
            worked_fix_index: None,
            tags: normalize_tags(tags),
        }
    }

    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.as_ref().is_some_and(|tags| tags.iter().any(|value| value == tag))
    }

    /// Validate one record against the store invariants.
    ///
    /// # Errors
    /// Returns [`CoreError::Validation`] when the id is blank, the worked-fix
    /// marker points outside `result.fixes`, the tag list is present but empty,
    /// or a fix confidence is outside `[0, 100]`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.id.0.trim().is_empty() {
            return Err(CoreError::Validation("id MUST be non-empty".to_string()));
        }

        if let Some(index) = self.worked_fix_index {
            if index >= self.result.fixes.len() {
                return Err(CoreError::Validation(format!(
                    "workedFixIndex {index} is out of range for {} fixes",
                    self.result.fixes.len()
                )));
            }
        }

        if self.tags.as_ref().is_some_and(Vec::is_empty) {
            return Err(CoreError::Validation(
                "tags MUST be omitted rather than empty".to_string(),
            ));
        }

        for (index, fix) in self.result.fixes.iter().enumerate() {
            if !fix.confidence.is_finite() || !(0.0..=100.0).contains(&fix.confidence) {
                return Err(CoreError::Validation(format!(
                    "fix {index} confidence MUST be in [0, 100]"
                )));
            }
        }

        Ok(())
    }

    /// Bring a record read back from persistence in line with the invariants
    /// that can be restored without losing the analysis itself.
    ///
    /// Returns `true` when something was changed.
    pub fn repair(&mut self) -> bool {
        let mut changed = false;

        if self.worked_fix_index.is_some_and(|index| index >= self.result.fixes.len()) {
            self.worked_fix_index = None;
            changed = true;
        }

        if self.tags.as_ref().is_some_and(Vec::is_empty) {
            self.tags = None;
            changed = true;
        }

        changed
    }
}

fn normalize_tags(tags: &[String]) -> Option<Vec<String>> {
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() || normalized.iter().any(|existing| existing == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }

    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Current wall clock in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).unwrap_or(i64::MAX)
}

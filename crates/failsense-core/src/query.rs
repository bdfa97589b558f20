//! Pure filtering over a history snapshot.
//!
//! Every predicate is independently optional. The effective filter is the AND
//! of the active predicates, and filtering never reorders its input.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::HistoryItem;

const DAY_MS: i64 = 86_400_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DateRange {
    Today,
    Week,
    Month,
}

impl DateRange {
    #[must_use]
    pub fn window_ms(self) -> i64 {
        match self {
            Self::Today => DAY_MS,
            Self::Week => 7 * DAY_MS,
            Self::Month => 30 * DAY_MS,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Today => "today",
            Self::Week => "week",
            Self::Month => "month",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "today" => Some(Self::Today),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(self, now_ms: i64, timestamp: i64) -> bool {
        now_ms.saturating_sub(timestamp) < self.window_ms()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct HistoryFilter {
    pub text: Option<String>,
    pub error_type: Option<String>,
    pub date_range: Option<DateRange>,
    pub tag: Option<String>,
}

impl HistoryFilter {
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    #[must_use]
    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = Some(date_range);
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    fn active_text(&self) -> Option<String> {
        self.text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .map(str::to_lowercase)
    }

    fn active_error_type(&self) -> Option<String> {
        self.error_type
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .map(str::to_lowercase)
    }

    fn active_tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|value| !value.trim().is_empty())
    }

    /// `true` when no predicate is active, i.e. filtering is the identity.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.active_text().is_none()
            && self.active_error_type().is_none()
            && self.date_range.is_none()
            && self.active_tag().is_none()
    }

    #[must_use]
    pub fn matches(&self, item: &HistoryItem, now_ms: i64) -> bool {
        CompiledFilter::new(self).matches(item, now_ms)
    }
}

/// Filter with its case-folded needles computed once per query.
struct CompiledFilter<'a> {
    text: Option<String>,
    error_type: Option<String>,
    date_range: Option<DateRange>,
    tag: Option<&'a str>,
}

impl<'a> CompiledFilter<'a> {
    fn new(filter: &'a HistoryFilter) -> Self {
        Self {
            text: filter.active_text(),
            error_type: filter.active_error_type(),
            date_range: filter.date_range,
            tag: filter.active_tag(),
        }
    }

    fn matches(&self, item: &HistoryItem, now_ms: i64) -> bool {
        if let Some(needle) = &self.text {
            if !text_matches(item, needle) {
                return false;
            }
        }

        if let Some(needle) = &self.error_type {
            if !item.result.error_type.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }

        if let Some(range) = self.date_range {
            if !range.contains(now_ms, item.timestamp) {
                return false;
            }
        }

        if let Some(tag) = self.tag {
            if !item.has_tag(tag) {
                return false;
            }
        }

        true
    }
}

fn text_matches(item: &HistoryItem, needle: &str) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);

    contains(&item.result.error_type)
        || contains(&item.result.root_cause)
        || contains(&item.code)
        || item.result.fixes.iter().any(|fix| contains(&fix.fix))
        || item.tags.as_ref().is_some_and(|tags| tags.iter().any(|tag| contains(tag)))
}

/// Apply `filter` to `items`, preserving their order.
#[must_use]
pub fn filter_history<'a>(
    items: &'a [HistoryItem],
    filter: &HistoryFilter,
    now_ms: i64,
) -> Vec<&'a HistoryItem> {
    let compiled = CompiledFilter::new(filter);
    items.iter().filter(|item| compiled.matches(item, now_ms)).collect()
}

/// Distinct values used to populate filter choices.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct HistoryFacets {
    /// Error types in first-seen order.
    pub unique_error_types: Vec<String>,
    /// Tags, deduplicated and sorted ascending.
    pub all_tags: Vec<String>,
}

/// Facets are always derived from the full, unfiltered snapshot.
#[must_use]
pub fn derive_facets(items: &[HistoryItem]) -> HistoryFacets {
    let mut unique_error_types: Vec<String> = Vec::new();
    let mut all_tags = BTreeSet::new();

    for item in items {
        if !unique_error_types.iter().any(|seen| seen == &item.result.error_type) {
            unique_error_types.push(item.result.error_type.clone());
        }
        for tag in item.tags.iter().flatten() {
            all_tags.insert(tag.clone());
        }
    }

    HistoryFacets { unique_error_types, all_tags: all_tags.into_iter().collect() }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryView {
    pub items: Vec<HistoryItem>,
    pub matched: usize,
    pub total: usize,
    pub facets: HistoryFacets,
}

#[must_use]
pub fn build_view(items: &[HistoryItem], filter: &HistoryFilter, now_ms: i64) -> HistoryView {
    let matched = filter_history(items, filter, now_ms).into_iter().cloned().collect::<Vec<_>>();
    HistoryView {
        matched: matched.len(),
        total: items.len(),
        items: matched,
        facets: derive_facets(items),
    }
}

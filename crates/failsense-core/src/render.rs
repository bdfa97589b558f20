//! Human-readable views of stored analyses: export reports and list rows.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{ExportFormat, Fix, HistoryId, HistoryItem};

const PREVIEW_MAX_LINES: usize = 3;
const PREVIEW_MAX_CHARS: usize = 120;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 3_600_000;
const DAY_MS: i64 = 86_400_000;

/// Short preview of analyzed input: first lines, capped in length, with an
/// ellipsis whenever anything was cut.
#[must_use]
pub fn code_preview(code: &str) -> String {
    let lines = code.split('\n').collect::<Vec<_>>();
    let head = lines.iter().take(PREVIEW_MAX_LINES).copied().collect::<Vec<_>>().join("\n");
    let mut preview = head.chars().take(PREVIEW_MAX_CHARS).collect::<String>();

    if code.chars().count() > PREVIEW_MAX_CHARS || lines.len() > PREVIEW_MAX_LINES {
        preview.push_str("...");
    }
    preview
}

/// Age of `timestamp` relative to `now_ms`. Anything a week or older is shown
/// as its UTC calendar date.
#[must_use]
pub fn relative_age(now_ms: i64, timestamp: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp);
    let minutes = diff.div_euclid(MINUTE_MS);
    let hours = diff.div_euclid(HOUR_MS);
    let days = diff.div_euclid(DAY_MS);

    if minutes < 1 {
        "Just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}m ago")
    } else if hours < 24 {
        format!("{hours}h ago")
    } else if days < 7 {
        format!("{days}d ago")
    } else {
        calendar_date(timestamp)
    }
}

fn calendar_date(timestamp: i64) -> String {
    match OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp) * 1_000_000) {
        Ok(at) => format!("{:04}-{:02}-{:02}", at.year(), u8::from(at.month()), at.day()),
        Err(_) => timestamp.to_string(),
    }
}

/// Confidence as a whole percentage. The analyzer reports fractions in
/// `[0, 1]`; larger values are already percentages.
fn confidence_percent(fix: &Fix) -> String {
    let percent = if fix.confidence <= 1.0 { fix.confidence * 100.0 } else { fix.confidence };
    format!("{percent:.0}%")
}

#[must_use]
pub fn render_item(item: &HistoryItem, format: ExportFormat) -> String {
    match format {
        ExportFormat::Markdown => render_markdown(item),
        ExportFormat::Text => render_text(item),
    }
}

fn render_markdown(item: &HistoryItem) -> String {
    let result = &item.result;
    let mut output = String::new();

    output.push_str(&format!("# {}\n\n", result.error_type));
    output.push_str(&format!("- **Id:** {}\n", item.id));
    output.push_str(&format!("- **Language:** {}\n", item.language));
    output.push_str(&format!("- **Analyzed:** {}\n", calendar_date(item.timestamp)));
    if let Some(tags) = &item.tags {
        output.push_str(&format!("- **Tags:** {}\n", tags.join(", ")));
    }

    output.push_str("\n## Root Cause\n\n");
    output.push_str(&result.root_cause);
    output.push_str("\n\n## Explanation\n\n");
    output.push_str(&result.explanation);

    output.push_str("\n\n## Suggested Fixes\n\n");
    if result.fixes.is_empty() {
        output.push_str("_No fixes suggested._\n");
    }
    for (index, fix) in result.fixes.iter().enumerate() {
        let marker = if item.worked_fix_index == Some(index) { " (worked)" } else { "" };
        output.push_str(&format!(
            "{}. **{}** ({}){}\n   {}\n",
            index + 1,
            fix.fix,
            confidence_percent(fix),
            marker,
            fix.explanation
        ));
    }

    output.push_str(&format!("\n## Input\n\n```{}\n{}\n```\n", item.language, item.code));
    output
}

fn render_text(item: &HistoryItem) -> String {
    let result = &item.result;
    let mut output = String::new();

    output.push_str(&format!("Error type: {}\n", result.error_type));
    output.push_str(&format!("Id: {}\n", item.id));
    output.push_str(&format!("Language: {}\n", item.language));
    output.push_str(&format!("Analyzed: {}\n", calendar_date(item.timestamp)));
    if let Some(tags) = &item.tags {
        output.push_str(&format!("Tags: {}\n", tags.join(", ")));
    }

    output.push_str(&format!("\nRoot cause:\n{}\n", result.root_cause));
    output.push_str(&format!("\nExplanation:\n{}\n", result.explanation));

    output.push_str("\nSuggested fixes:\n");
    if result.fixes.is_empty() {
        output.push_str("(none)\n");
    }
    for (index, fix) in result.fixes.iter().enumerate() {
        let marker = if item.worked_fix_index == Some(index) { " [worked]" } else { "" };
        output.push_str(&format!(
            "[{}] {} ({}){}\n    {}\n",
            index + 1,
            fix.fix,
            confidence_percent(fix),
            marker,
            fix.explanation
        ));
    }

    output.push_str("\n---\nInput:\n");
    output.push_str(&item.code);
    output.push('\n');
    output
}

/// One row of the history list.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct HistorySummary {
    pub id: HistoryId,
    pub timestamp: i64,
    pub age: String,
    pub error_type: String,
    pub root_cause: String,
    pub language: String,
    pub preview: String,
    pub fix_count: usize,
    pub worked_fix_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl HistorySummary {
    #[must_use]
    pub fn from_item(item: &HistoryItem, now_ms: i64) -> Self {
        Self {
            id: item.id.clone(),
            timestamp: item.timestamp,
            age: relative_age(now_ms, item.timestamp),
            error_type: item.result.error_type.clone(),
            root_cause: item.result.root_cause.clone(),
            language: item.language.clone(),
            preview: code_preview(&item.code),
            fix_count: item.result.fixes.len(),
            worked_fix_index: item.worked_fix_index,
            tags: item.tags.clone().unwrap_or_default(),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::{CoreError, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT, MIN_HISTORY_LIMIT};

pub const SUPPORTED_LANGUAGES: [&str; 9] =
    ["javascript", "typescript", "python", "java", "csharp", "go", "rust", "ruby", "php"];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Markdown,
    Text,
}

impl ExportFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "markdown" => Some(Self::Markdown),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    #[must_use]
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

/// User settings persisted as one blob. Fields missing from a stored blob
/// take their default, so older blobs keep loading as new fields appear.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub default_language: String,
    pub auto_analyze: bool,
    pub export_format: ExportFormat,
    pub history_limit: usize,
    pub show_notifications: bool,
    pub auto_clear_tags: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            default_language: "javascript".to_string(),
            auto_analyze: false,
            export_format: ExportFormat::Markdown,
            history_limit: DEFAULT_HISTORY_LIMIT,
            show_notifications: true,
            auto_clear_tags: true,
        }
    }
}

impl Preferences {
    /// # Errors
    /// Returns [`CoreError::Validation`] when `historyLimit` is outside
    /// `1..=50` or `defaultLanguage` is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_HISTORY_LIMIT..=MAX_HISTORY_LIMIT).contains(&self.history_limit) {
            return Err(CoreError::Validation(format!(
                "historyLimit MUST be between {MIN_HISTORY_LIMIT} and {MAX_HISTORY_LIMIT}, got {}",
                self.history_limit
            )));
        }

        if self.default_language.trim().is_empty() {
            return Err(CoreError::Validation("defaultLanguage MUST be non-empty".to_string()));
        }

        Ok(())
    }

    /// Copy with every field forced back into its valid range.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.history_limit = self.history_limit.clamp(MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT);
        if self.default_language.trim().is_empty() {
            self.default_language = Self::default().default_language;
        }
        self
    }

    #[must_use]
    pub fn is_supported_language(language: &str) -> bool {
        SUPPORTED_LANGUAGES.contains(&language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let prefs = Preferences::default();
        assert_eq!(prefs.default_language, "javascript");
        assert!(!prefs.auto_analyze);
        assert_eq!(prefs.export_format, ExportFormat::Markdown);
        assert_eq!(prefs.history_limit, 20);
        assert!(prefs.show_notifications);
        assert!(prefs.auto_clear_tags);
        assert!(prefs.validate().is_ok());
    }

    #[test]
    fn stored_fields_merge_over_defaults() -> Result<(), serde_json::Error> {
        let prefs: Preferences =
            serde_json::from_str(r#"{"historyLimit": 35, "exportFormat": "text"}"#)?;
        assert_eq!(prefs.history_limit, 35);
        assert_eq!(prefs.export_format, ExportFormat::Text);
        assert_eq!(prefs.default_language, "javascript");
        assert!(prefs.auto_clear_tags);
        Ok(())
    }

    #[test]
    fn serializes_with_camel_case_keys() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(Preferences::default())?;
        assert_eq!(value["defaultLanguage"], "javascript");
        assert_eq!(value["exportFormat"], "markdown");
        assert_eq!(value["historyLimit"], 20);
        assert_eq!(value["autoClearTags"], true);
        Ok(())
    }

    #[test]
    fn validate_rejects_limits_outside_range() {
        let mut prefs = Preferences { history_limit: 0, ..Preferences::default() };
        assert!(prefs.validate().is_err());

        prefs.history_limit = 51;
        assert!(prefs.validate().is_err());

        prefs.history_limit = 50;
        assert!(prefs.validate().is_ok());

        prefs.default_language = "  ".to_string();
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn sanitized_clamps_into_range() {
        let prefs = Preferences {
            history_limit: 500,
            default_language: String::new(),
            ..Preferences::default()
        }
        .sanitized();
        assert_eq!(prefs.history_limit, 50);
        assert_eq!(prefs.default_language, "javascript");

        let prefs = Preferences { history_limit: 0, ..Preferences::default() }.sanitized();
        assert_eq!(prefs.history_limit, 1);
    }

    #[test]
    fn export_format_names_and_extensions() {
        assert_eq!(ExportFormat::parse("text"), Some(ExportFormat::Text));
        assert_eq!(ExportFormat::parse("pdf"), None);
        assert_eq!(ExportFormat::Markdown.file_extension(), "md");
        assert_eq!(ExportFormat::Text.file_extension(), "txt");
        assert!(Preferences::is_supported_language("rust"));
        assert!(!Preferences::is_supported_language("cobol"));
    }
}

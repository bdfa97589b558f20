use std::sync::Arc;

use failsense_core::{
    build_view, now_ms, render_item, CoreError, ExportFormat, HistoryFilter, HistoryId,
    HistoryItem, HistorySummary, HistoryView, Preferences,
};
use failsense_store::{
    BlobStore, FeedbackOutcome, HistoryStore, ImportSummary, PreferencesStore,
};
use serde::{Deserialize, Serialize};

mod analyzer;
mod session;

pub use analyzer::{
    AnalyzeRequest, Analyzer, AnalyzerConfig, AnalyzerError, HttpAnalyzer, API_URL_ENV,
    DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS,
};
pub use session::Session;

pub const API_CONTRACT_VERSION: &str = "api.v1";

pub const EMPTY_INPUT_MESSAGE: &str = "Please enter some code to analyze";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    RemoteAnalysis(String),
    #[error("history item not found: {0}")]
    NotFound(HistoryId),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzeInput {
    pub log_text: String,
    /// Falls back to the preferred default language when absent or blank.
    pub language: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedReport {
    pub id: HistoryId,
    pub format: ExportFormat,
    pub file_name: String,
    pub content: String,
}

/// Application facade over the history store, preferences and analyzer.
pub struct FailSenseApi<A: Analyzer> {
    analyzer: A,
    history: HistoryStore<Arc<dyn BlobStore>>,
    preferences_store: PreferencesStore<Arc<dyn BlobStore>>,
    preferences: Preferences,
    session: Session,
}

impl<A: Analyzer> FailSenseApi<A> {
    /// Load preferences and open history bounded by `historyLimit`.
    ///
    /// # Errors
    /// Returns an error when the backend cannot be read.
    pub fn open(port: Arc<dyn BlobStore>, analyzer: A) -> Result<Self, ApiError> {
        let preferences_store = PreferencesStore::new(Arc::clone(&port));
        let preferences = preferences_store.load()?;
        let history = HistoryStore::open(port, preferences.history_limit)?;

        Ok(Self { analyzer, history, preferences_store, preferences, session: Session::new() })
    }

    #[must_use]
    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Run one analysis and record it as the newest history item.
    ///
    /// Tags given with the input are merged after the session's pending tags.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] for blank input (no request is made),
    /// [`ApiError::RemoteAnalysis`] when the analyzer fails (history is left
    /// unchanged), or a store error when the result cannot be persisted.
    pub fn analyze(&mut self, input: AnalyzeInput) -> Result<HistoryItem, ApiError> {
        if input.log_text.trim().is_empty() {
            return Err(ApiError::Validation(EMPTY_INPUT_MESSAGE.to_string()));
        }

        let language = input
            .language
            .filter(|language| !language.trim().is_empty())
            .unwrap_or_else(|| self.preferences.default_language.clone());
        let request = AnalyzeRequest { log_text: input.log_text, language };

        let result = self.analyzer.analyze(&request).map_err(|err| {
            tracing::warn!(error = %err, "analysis failed");
            ApiError::RemoteAnalysis(err.to_string())
        })?;

        let mut tags = self.session.pending_tags().to_vec();
        tags.extend(input.tags);

        let item = HistoryItem::new(request.log_text, request.language, result, &tags, now_ms());
        self.history.append(item.clone())?;
        tracing::info!(id = %item.id, error_type = %item.result.error_type, "analysis recorded");

        self.session.load(&item);
        if self.preferences.auto_clear_tags {
            self.session.clear_tags();
        }
        Ok(item)
    }

    #[must_use]
    pub fn items(&self) -> &[HistoryItem] {
        self.history.all()
    }

    #[must_use]
    pub fn history(&self, filter: &HistoryFilter) -> HistoryView {
        build_view(self.history.all(), filter, now_ms())
    }

    #[must_use]
    pub fn summaries(&self, filter: &HistoryFilter) -> Vec<HistorySummary> {
        let now = now_ms();
        build_view(self.history.all(), filter, now)
            .items
            .iter()
            .map(|item| HistorySummary::from_item(item, now))
            .collect()
    }

    /// # Errors
    /// Returns [`ApiError::NotFound`] when no item has `id`.
    pub fn get(&self, id: &HistoryId) -> Result<&HistoryItem, ApiError> {
        self.history.get(id).ok_or_else(|| ApiError::NotFound(id.clone()))
    }

    /// Show a stored analysis in the session.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] when no item has `id`.
    pub fn open_item(&mut self, id: &HistoryId) -> Result<(), ApiError> {
        let item = self.history.get(id).ok_or_else(|| ApiError::NotFound(id.clone()))?;
        self.session.load(item);
        Ok(())
    }

    /// Delete one analysis. Unknown ids are ignored and reported as `false`.
    ///
    /// # Errors
    /// Returns a store error when persistence fails.
    pub fn delete(&mut self, id: &HistoryId) -> Result<bool, ApiError> {
        let removed = self.history.delete_by_id(id)?;
        if removed && self.session.is_showing(id) {
            self.session.unload();
        }
        Ok(removed)
    }

    /// # Errors
    /// Returns a store error when persistence fails.
    pub fn clear(&mut self) -> Result<(), ApiError> {
        self.history.clear()?;
        self.session.unload();
        Ok(())
    }

    /// # Errors
    /// Returns a store error when `worked` names a fix the item does not have
    /// or persistence fails.
    pub fn record_feedback(
        &mut self,
        id: &HistoryId,
        fix_index: usize,
        worked: bool,
    ) -> Result<FeedbackOutcome, ApiError> {
        let outcome = self.history.record_feedback(id, fix_index, worked)?;
        if matches!(outcome, FeedbackOutcome::Updated { .. }) && self.session.is_showing(id) {
            self.session.annotate(fix_index, worked);
        }
        Ok(outcome)
    }

    /// Judge a fix of the analysis currently shown in the session.
    ///
    /// # Errors
    /// Returns [`ApiError::Validation`] when nothing is shown, otherwise the
    /// errors of [`Self::record_feedback`].
    pub fn fix_feedback(&mut self, fix_index: usize, worked: bool) -> Result<FeedbackOutcome, ApiError> {
        let Some(id) = self.session.current_id().cloned() else {
            return Err(ApiError::Validation("no analysis is currently shown".to_string()));
        };
        self.record_feedback(&id, fix_index, worked)
    }

    /// Render one analysis for download.
    ///
    /// # Errors
    /// Returns [`ApiError::NotFound`] when no item has `id`.
    pub fn export(
        &self,
        id: &HistoryId,
        format: Option<ExportFormat>,
    ) -> Result<ExportedReport, ApiError> {
        let item = self.get(id)?;
        let format = format.unwrap_or(self.preferences.export_format);
        Ok(ExportedReport {
            id: item.id.clone(),
            format,
            file_name: format!("failsense-analysis-{}.{}", item.id, format.file_extension()),
            content: render_item(item, format),
        })
    }

    /// # Errors
    /// Returns an error when an item is invalid, an id collides and
    /// `skip_existing` is unset, or persistence fails.
    pub fn import_history(
        &mut self,
        items: &[HistoryItem],
        skip_existing: bool,
    ) -> Result<ImportSummary, ApiError> {
        Ok(self.history.import(items, skip_existing)?)
    }

    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Persist `preferences` and apply the new history bound right away.
    /// Returns the ids evicted by a smaller bound.
    ///
    /// # Errors
    /// Returns [`ApiError::Core`] for invalid preferences or a store error when
    /// persistence fails.
    pub fn update_preferences(
        &mut self,
        preferences: Preferences,
    ) -> Result<Vec<HistoryId>, ApiError> {
        preferences.validate()?;
        self.preferences_store.save(&preferences)?;
        let evicted = self.history.set_capacity(preferences.history_limit)?;
        self.preferences = preferences;
        Ok(evicted)
    }

    /// # Errors
    /// Returns a store error when persistence fails.
    pub fn reset_preferences(&mut self) -> Result<&Preferences, ApiError> {
        let defaults = self.preferences_store.reset()?;
        self.history.set_capacity(defaults.history_limit)?;
        self.preferences = defaults;
        Ok(&self.preferences)
    }
}

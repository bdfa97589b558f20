use std::time::Duration;

use failsense_core::AnalysisResult;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "FAILSENSE_API_URL";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const GENERIC_FAILURE: &str = "Failed to analyze error";
const UNREADABLE_FAILURE: &str = "Analysis failed";

/// Body of one analysis request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub log_text: String,
    pub language: String,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AnalyzerError {
    /// The service answered with a non-success status. The message is meant
    /// for the user.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("analysis service unreachable: {0}")]
    Transport(String),
    #[error("analysis response could not be decoded: {0}")]
    Decode(String),
}

/// External collaborator that turns an error log into a diagnosis.
pub trait Analyzer {
    /// # Errors
    /// Returns an [`AnalyzerError`] when the diagnosis cannot be produced.
    fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult, AnalyzerError>;
}

impl<T: Analyzer + ?Sized> Analyzer for Box<T> {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult, AnalyzerError> {
        (**self).analyze(request)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_API_URL.to_string(), timeout_secs: DEFAULT_TIMEOUT_SECS }
    }
}

impl AnalyzerConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), ..Self::default() }
    }

    /// Endpoint from `FAILSENSE_API_URL`, falling back to the local default.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(value) if !value.trim().is_empty() => Self::new(value.trim()),
            _ => Self::default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Blocking HTTP client for the analysis service.
pub struct HttpAnalyzer {
    config: AnalyzerConfig,
    agent: ureq::Agent,
}

impl HttpAnalyzer {
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        let agent =
            ureq::AgentBuilder::new().timeout(Duration::from_secs(config.timeout_secs)).build();
        Self { config, agent }
    }

    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Probe the service and return its reported status.
    ///
    /// # Errors
    /// Returns an [`AnalyzerError`] when the service is unreachable, unhealthy,
    /// or answers with an unexpected body.
    pub fn health(&self) -> Result<String, AnalyzerError> {
        let url = self.config.endpoint("/health");
        let response = self.agent.get(&url).call().map_err(into_analyzer_error)?;
        let health = response
            .into_json::<HealthResponse>()
            .map_err(|err| AnalyzerError::Decode(err.to_string()))?;
        Ok(health.status)
    }
}

impl Analyzer for HttpAnalyzer {
    fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalysisResult, AnalyzerError> {
        let url = self.config.endpoint("/api/analyze");
        tracing::debug!(%url, language = %request.language, "requesting analysis");

        let response = self.agent.post(&url).send_json(request).map_err(into_analyzer_error)?;
        response
            .into_json::<AnalysisResult>()
            .map_err(|err| AnalyzerError::Decode(err.to_string()))
    }
}

fn into_analyzer_error(err: ureq::Error) -> AnalyzerError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            let message = failure_message(&body);
            tracing::warn!(status, %message, "analysis service rejected request");
            AnalyzerError::Rejected { status, message }
        }
        ureq::Error::Transport(transport) => AnalyzerError::Transport(transport.to_string()),
    }
}

/// User-facing message for a failed response body.
fn failure_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => value
            .get("detail")
            .and_then(serde_json::Value::as_str)
            .filter(|detail| !detail.is_empty())
            .map_or_else(|| GENERIC_FAILURE.to_string(), str::to_string),
        Err(_) => UNREADABLE_FAILURE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_prefers_detail() {
        assert_eq!(failure_message(r#"{"detail": "Log text is empty"}"#), "Log text is empty");
    }

    #[test]
    fn failure_message_falls_back_for_json_without_detail() {
        assert_eq!(failure_message(r#"{"error": "boom"}"#), GENERIC_FAILURE);
        assert_eq!(failure_message(r#"{"detail": [{"loc": ["body"]}]}"#), GENERIC_FAILURE);
    }

    #[test]
    fn failure_message_for_unparseable_body() {
        assert_eq!(failure_message("<html>502 Bad Gateway</html>"), UNREADABLE_FAILURE);
        assert_eq!(failure_message(""), UNREADABLE_FAILURE);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = AnalyzerConfig::new("http://127.0.0.1:9000/");
        assert_eq!(config.endpoint("/api/analyze"), "http://127.0.0.1:9000/api/analyze");
        assert_eq!(AnalyzerConfig::default().endpoint("/health"), "http://localhost:8000/health");
    }

    #[test]
    fn request_serializes_wire_field_names() -> Result<(), serde_json::Error> {
        let request =
            AnalyzeRequest { log_text: "boom".to_string(), language: "python".to_string() };
        let value = serde_json::to_value(&request)?;
        assert_eq!(value, serde_json::json!({"log_text": "boom", "language": "python"}));
        Ok(())
    }
}

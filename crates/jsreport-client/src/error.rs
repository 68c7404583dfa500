//! Error types for the reporting client.
//!
//! Every operation returns [`ReportError`]. Callers that only care about
//! template problems match on [`ReportError::Render`], which carries the
//! structured [`JsReportError`] built from the server's error response.

use thiserror::Error;

/// Prefix of every [`JsReportError::message`] raised by the render endpoint.
pub const RENDER_FAILED_PREFIX: &str = "Unable to render template. ";

/// Used when a failed render response carries no readable description.
pub const FALLBACK_ERROR_MESSAGE: &str = "No error details returned by the reporting server";

/// Result type for reporting operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// All failures surfaced by the client.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The server answered the render call with a non-200 status.
    #[error(transparent)]
    Render(#[from] JsReportError),

    /// The call was cancelled, either by the caller's token or by the
    /// configured timeout. The two are intentionally indistinguishable.
    #[error("request was cancelled")]
    Cancelled,

    /// Connection, TLS, decoding, or non-success status on a plain endpoint.
    #[error("network request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request could not be turned into JSON. Never sent.
    #[error("failed to serialize render request: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A typed request failed local validation. Never sent.
    #[error("invalid render request: {0}")]
    InvalidRequest(String),

    #[error("invalid service uri: {0}")]
    InvalidUri(#[from] url::ParseError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to compress request body: {0}")]
    Compression(#[source] std::io::Error),

    /// Reading the report stream or writing it out failed.
    #[error("report i/o failed: {0}")]
    Io(#[source] std::io::Error),
}

impl ReportError {
    /// Whether this error is the single cancellation outcome.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReportError::Cancelled)
    }

    /// The structured render failure, if that is what this is.
    pub fn render_error(&self) -> Option<&JsReportError> {
        match self {
            ReportError::Render(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status code attached to the failure, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ReportError::Render(e) => Some(e.status_code()),
            ReportError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// A rendering failure reported by the server.
///
/// Built once from a non-200 response of `POST /api/report` and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (HTTP {status_code})")]
pub struct JsReportError {
    message: String,
    response_error_message: String,
    status_code: u16,
}

impl JsReportError {
    /// Build the error from the message located in the response body.
    ///
    /// `None` (or a blank message) falls back to [`FALLBACK_ERROR_MESSAGE`].
    pub fn new(response_error_message: Option<String>, status_code: u16) -> Self {
        let response_error_message = response_error_message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
        Self {
            message: format!("{RENDER_FAILED_PREFIX}{response_error_message}"),
            response_error_message,
            status_code,
        }
    }

    /// Full message: operation prefix followed by the server's text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The text extracted from the server's error body.
    pub fn response_error_message(&self) -> &str {
        &self.response_error_message
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

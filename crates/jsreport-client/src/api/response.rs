//! Interpretation of render responses.
//!
//! A `200 OK` becomes a [`Report`] whose content streams straight from the
//! connection. Anything else becomes [`ReportError::Render`] carrying the
//! message located in the error body, regardless of status family.

use std::collections::HashMap;
use std::fmt;

use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::cancel::CancelScope;
use crate::error::{JsReportError, ReportError, Result};
use crate::report::{Report, ReportContent, ReportMeta};

/// Upper bound on raw body text copied into an error message.
pub const MAX_ERROR_BODY_CHARS: usize = 4096;

/// Entity headers. They are merged after the general response headers and
/// win on collision.
const CONTENT_HEADERS: &[&str] = &["allow", "expires", "last-modified"];

/// Turn the raw render response into a [`Report`] or a structured error.
///
/// `scope` is the call's cancellation scope; it keeps guarding the report
/// content after this returns.
pub async fn interpret_render(response: Response, scope: &CancelScope) -> Result<Report> {
    let status = response.status();
    if status != StatusCode::OK {
        let message = error_body_message(response.text().await);
        debug!("render failed with HTTP {status}: {message:?}");
        return Err(ReportError::Render(JsReportError::new(
            message,
            status.as_u16(),
        )));
    }

    let meta = ReportMeta::new(merge_headers(response.headers()));
    debug!(
        "render succeeded: content-type={:?}, {} metadata entries",
        meta.content_type(),
        meta.len()
    );
    Ok(Report::new(
        ReportContent::from_response(response, scope.clone()),
        meta,
    ))
}

/// Message for an error response whose body may not have been readable.
///
/// A failed read is reported as such instead of falling back to the generic
/// "no details" text.
fn error_body_message<E: fmt::Display>(body: std::result::Result<String, E>) -> Option<String> {
    match body {
        Ok(body) => extract_error_message(&body),
        Err(e) => {
            warn!("failed to read render error body: {e}");
            Some(format!("Failed to read the error response body: {e}"))
        }
    }
}

/// Locate a human-readable message in an error body.
///
/// JSON bodies use their `message` (or `error.message`) property; other
/// non-blank bodies are used verbatim, capped at [`MAX_ERROR_BODY_CHARS`].
pub fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| value.pointer("/error/message").and_then(Value::as_str));
        if let Some(message) = message.filter(|m| !m.trim().is_empty()) {
            return Some(message.to_string());
        }
        if let Some(text) = value.as_str().filter(|m| !m.trim().is_empty()) {
            return Some(text.to_string());
        }
        if value.is_object() || value.is_array() || value.is_null() {
            return None;
        }
    }

    Some(truncate_chars(trimmed, MAX_ERROR_BODY_CHARS))
}

/// Flatten response headers into report metadata.
///
/// General headers go in first, then entity headers, so an entity header
/// overwrites a same-named general one. Only the first value of a
/// repeated header is kept.
pub fn merge_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut meta = HashMap::with_capacity(headers.keys_len());
    let (content, general): (Vec<_>, Vec<_>) =
        headers.keys().partition(|name| is_content_header(name.as_str()));

    for name in general.into_iter().chain(content) {
        if let Some(value) = headers.get(name) {
            meta.insert(
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            );
        }
    }
    meta
}

fn is_content_header(name: &str) -> bool {
    name.starts_with("content-") || CONTENT_HEADERS.contains(&name)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut out = text.to_string();
            out.truncate(cut);
            out.push('…');
            out
        }
        None => text.to_string(),
    }
}

//! HTTP endpoint handlers.

use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::read::GzDecoder;
use futures::StreamExt;
use futures::stream;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::RecordedRequest;
use crate::engine::{self, ENGINES, RECIPES, RenderFailure, StoredTemplate};

const FILE_EXTENSION: &str = "file-extension";
const REPORT_ID: &str = "report-id";

/// Server settings fixed at startup.
#[derive(Debug)]
pub struct Settings {
    pub credentials: Option<(String, String)>,
    pub render_delay: Duration,
    pub render_timeout: Duration,
    pub stall_body: Duration,
    pub templates: Vec<StoredTemplate>,
    pub version: String,
}

/// Shared state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    pub next_report_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            recorded: Arc::default(),
            next_report_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn record(&self, request: RecordedRequest) {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
    }
}

/// Basic-auth gate. Passes everything through when no credentials are set.
pub async fn require_auth(State(app): State<AppState>, request: Request, next: Next) -> Response {
    let Some((username, password)) = &app.settings.credentials else {
        return next.run(request).await;
    };

    let supplied = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok());

    match supplied.as_deref().and_then(|pair| pair.split_once(':')) {
        Some((user, pass)) if user == username.as_str() && pass == password.as_str() => {
            next.run(request).await
        }
        _ => {
            debug!("rejecting unauthenticated {} {}", request.method(), request.uri());
            (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"jsreport\"")],
                "Unauthorized",
            )
                .into_response()
        }
    }
}

/// POST /api/report: render a template.
///
/// Accepts gzip request bodies. Every parsed request is recorded before
/// rendering so tests can inspect exactly what was sent.
pub async fn post_report(State(app): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let content_encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let raw = match content_encoding.as_deref() {
        Some(encoding) if encoding.eq_ignore_ascii_case("gzip") => match gunzip(&body) {
            Ok(raw) => raw,
            Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid gzip body: {e}")),
        },
        _ => body.to_vec(),
    };

    let request: Value = match serde_json::from_slice(&raw) {
        Ok(value) => value,
        Err(e) => return failure(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}")),
    };

    app.record(RecordedRequest {
        content_encoding,
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: request.clone(),
    });

    let settings = &app.settings;
    if !settings.render_delay.is_zero() {
        if settings.render_delay > settings.render_timeout {
            tokio::time::sleep(settings.render_timeout).await;
            warn!("render exceeded {:?}", settings.render_timeout);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, "Timeout during render");
        }
        tokio::time::sleep(settings.render_delay).await;
    }

    match engine::render(&request, &settings.templates) {
        Ok(rendered) => {
            let report_id = app.next_report_id.fetch_add(1, Ordering::Relaxed).to_string();
            info!(
                "rendered report {report_id}: {} bytes of {}",
                rendered.body.len(),
                rendered.content_type
            );
            (
                [
                    (header::CONTENT_TYPE, rendered.content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=report.{}", rendered.extension),
                    ),
                    (
                        HeaderName::from_static(FILE_EXTENSION),
                        rendered.extension.to_string(),
                    ),
                    (HeaderName::from_static(REPORT_ID), report_id),
                ],
                report_body(rendered.body, settings.stall_body),
            )
                .into_response()
        }
        Err(RenderFailure { status, message }) => {
            debug!("render failed with {status}: {message}");
            failure(status, message)
        }
    }
}

/// GET /api/recipe
pub async fn get_recipes() -> Json<&'static [&'static str]> {
    Json(RECIPES)
}

/// GET /api/engine
pub async fn get_engines() -> Json<&'static [&'static str]> {
    Json(ENGINES)
}

/// GET /api/version: plain-text package version.
pub async fn get_version(State(app): State<AppState>) -> String {
    app.settings.version.clone()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let message = message.into();
    let body = json!({
        "message": message,
        "stack": format!("Error: {message}\n    at render (jsreport-local)"),
    });
    (status, Json(body)).into_response()
}

/// The report body, optionally sent in two halves with a pause in between.
fn report_body(body: Vec<u8>, stall: Duration) -> Body {
    if stall.is_zero() || body.len() < 2 {
        return Body::from(body);
    }
    let mut head = body;
    let tail = head.split_off(head.len() / 2);
    let chunks = stream::once(async move { Ok::<_, std::io::Error>(head) }).chain(stream::once(
        async move {
            tokio::time::sleep(stall).await;
            Ok(tail)
        },
    ));
    Body::from_stream(chunks)
}

fn gunzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len() * 2);
    GzDecoder::new(body).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn gunzip_inverts_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"a\":1}").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(gunzip(&compressed).unwrap(), b"{\"a\":1}");
        assert!(gunzip(b"not gzip").is_err());
    }

    #[tokio::test]
    async fn stalled_body_arrives_in_two_halves() {
        let body = report_body(b"hello".to_vec(), Duration::from_millis(5));
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn failure_body_carries_message() {
        let response = failure(StatusCode::BAD_REQUEST, "Engine 'x' not found");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

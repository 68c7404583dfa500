//! HTTP exchange with the reporting server.
//!
//! [`Transport`] owns the pooled `reqwest` client and the configuration it
//! was built from. Each request gets the configured user agent, the Basic
//! `Authorization` header when credentials are set, and, for render bodies,
//! optional gzip compression. No reqwest-level timeout is configured: the
//! caller's [`CancelScope`] is the only abort path.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::cancel::CancelScope;
use crate::config::ClientConfig;
use crate::error::{ReportError, Result};

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const GZIP_ENCODING: &str = "gzip";

/// Stateless HTTP layer bound to one [`ClientConfig`].
#[derive(Clone, Debug)]
pub struct Transport {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl Transport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// A transport with a different configuration sharing this one's
    /// connection pool.
    pub fn with_config(&self, config: ClientConfig) -> Self {
        Self {
            client: self.client.clone(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Cancellation scope for one call: configured timeout linked with the
    /// caller's token.
    pub fn scope(&self, cancel: Option<&CancellationToken>) -> CancelScope {
        CancelScope::new(self.config.timeout, cancel)
    }

    /// POST a JSON body, gzip-compressed when the config asks for it.
    pub async fn post_json(&self, path: &str, body: String, scope: &CancelScope) -> Result<Response> {
        let (payload, compressed) = if self.config.compression {
            (gzip(body.as_bytes())?, true)
        } else {
            (body.into_bytes(), false)
        };
        trace!(
            "request body: {} bytes (compressed={compressed})",
            payload.len()
        );

        let mut request = self
            .request(Method::POST, path)?
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        if compressed {
            request = request.header(CONTENT_ENCODING, GZIP_ENCODING);
        }
        self.send(request.body(payload), scope).await
    }

    pub async fn get(&self, path: &str, scope: &CancelScope) -> Result<Response> {
        let request = self.request(Method::GET, path)?;
        self.send(request, scope).await
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.config.endpoint(path)?;
        debug!("HTTP {method} {url}");
        let mut request = self
            .client
            .request(method, url)
            .header(USER_AGENT, &self.config.user_agent);
        if let Some(credentials) = self.config.basic_credentials() {
            request = request.header(AUTHORIZATION, basic_auth_header(&credentials)?);
        }
        Ok(request)
    }

    async fn send(&self, request: RequestBuilder, scope: &CancelScope) -> Result<Response> {
        let start = Instant::now();
        let response = scope
            .run(async { request.send().await.map_err(ReportError::from) })
            .await?;
        debug!(
            "HTTP {} in {:.3}s",
            response.status(),
            start.elapsed().as_secs_f64()
        );
        Ok(response)
    }
}

/// Gzip `body` into a new buffer.
pub fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body).map_err(ReportError::Compression)?;
    encoder.finish().map_err(ReportError::Compression)
}

/// `Basic base64(user:password)`, marked sensitive so it never shows up in
/// debug output.
fn basic_auth_header(credentials: &str) -> Result<HeaderValue> {
    let encoded = STANDARD.encode(credentials.as_bytes());
    let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
        .map_err(|e| ReportError::Config(format!("invalid credentials header: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

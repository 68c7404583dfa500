//! Async client for the [jsreport](https://jsreport.net/) reporting server.
//!
//! `jsreport-client` submits rendering jobs to a remote server over HTTP and
//! hands back the generated document (HTML, PDF, spreadsheet, ...) as a byte
//! stream plus metadata. It does not render anything itself, and it never
//! retries, queues, or caches.
//!
//! The entry point is [`ReportingService`]. A render goes through three
//! steps, each in its own module under [`api`]:
//!
//! 1. the request, in whatever shape the caller built it, is normalized into
//!    a [`RenderPayload`] and serialized to canonical JSON;
//! 2. the [`Transport`](api::Transport) posts it to `api/report` (Basic auth,
//!    optional gzip) inside a [`CancelScope`](api::CancelScope) that links the
//!    configured timeout with the caller's [`CancellationToken`];
//! 3. the response becomes a [`Report`], or a [`ReportError::Render`] carrying
//!    the server's own error text.
//!
//! # Getting started
//!
//! ```toml
//! [dependencies]
//! jsreport-client = { path = "../jsreport-client" }
//! ```
//!
//! ```ignore
//! use jsreport_client::{Engine, Recipe, RenderRequest, ReportingService, Template};
//!
//! #[tokio::main]
//! async fn main() -> jsreport_client::Result<()> {
//!     let service = ReportingService::new("http://localhost:5488")?;
//!
//!     let request = RenderRequest::new(Template::inline(
//!         "<h1>{{:title}}</h1>",
//!         Engine::Jsrender,
//!         Recipe::ChromePdf,
//!     ))
//!     .with_data(&serde_json::json!({ "title": "Hello" }))?;
//!
//!     let report = service.render(request).await?;
//!     println!("{:?}", report.meta.content_type());
//!     report.save("hello.pdf").await?;
//!     Ok(())
//! }
//! ```
//!
//! Stored templates can be rendered by short id or name, and any serializable
//! value matching the request shape is accepted as well:
//!
//! ```ignore
//! let report = service.render_by_shortid("rkJTnK2ce", &invoice).await?;
//! let report = service.render_by_name_json("invoice-main", r#"{"number": 7}"#).await?;
//! let report = service
//!     .render_value(&json!({ "template": { "content": "foo", "engine": "none", "recipe": "html" } }))
//!     .await?;
//! ```
//!
//! # Errors and cancellation
//!
//! A non-200 answer from the render endpoint is always a
//! [`ReportError::Render`]; the list and version endpoints report status
//! failures as plain [`ReportError::Http`]. A configured timeout and a
//! cancelled token both surface as [`ReportError::Cancelled`].

pub mod api;
pub mod config;
pub mod error;
pub mod report;
pub mod request;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

pub use api::{RenderData, RenderPayload};
pub use config::ClientConfig;
pub use error::{FALLBACK_ERROR_MESSAGE, JsReportError, RENDER_FAILED_PREFIX, ReportError, Result};
pub use report::{Report, ReportContent, ReportMeta};
pub use request::{Engine, Recipe, RenderOptions, RenderRequest, Template, TemplateAddress};
pub use tokio_util::sync::CancellationToken;

use api::Transport;
use api::response::interpret_render;

/// Render endpoint, relative to the service URI.
pub const RENDER_PATH: &str = "api/report";
pub const RECIPES_PATH: &str = "api/recipe";
pub const ENGINES_PATH: &str = "api/engine";
pub const VERSION_PATH: &str = "api/version";

/// Boxed future returned by [`ReportingApi`] methods.
///
/// Keeps the trait dyn-compatible so callers can hold a
/// `Box<dyn ReportingApi>` and swap in a fake.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

// ── Service trait ──────────────────────────────────────────────────

/// The operations of a reporting server, as seen by an application.
pub trait ReportingApi: Send + Sync {
    /// Render a normalized payload, optionally cancellable by `cancel`.
    fn render_payload(
        &self,
        payload: RenderPayload,
        cancel: Option<CancellationToken>,
    ) -> ApiFuture<'_, Report>;

    /// Names of the recipes registered on the server.
    fn list_recipes(&self) -> ApiFuture<'_, Vec<String>>;

    /// Names of the engines registered on the server.
    fn list_engines(&self) -> ApiFuture<'_, Vec<String>>;

    /// Server package version.
    fn server_version(&self) -> ApiFuture<'_, String>;
}

// ── Client ─────────────────────────────────────────────────────────

/// Async client for one reporting server.
///
/// Cloning is cheap and clones share the connection pool. Configuration is
/// immutable: the `with_*` methods return a new handle and leave calls in
/// flight on the old one untouched.
#[derive(Clone, Debug)]
pub struct ReportingService {
    transport: Transport,
}

impl ReportingService {
    /// Client for an unauthenticated server.
    pub fn new(service_uri: &str) -> Result<Self> {
        Self::from_config(ClientConfig::new(service_uri)?)
    }

    /// Client sending Basic-auth credentials with every call.
    pub fn with_credentials(
        service_uri: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Self::from_config(ClientConfig::new(service_uri)?.with_credentials(username, password))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        self.transport.config()
    }

    /// Same connection pool, different configuration.
    pub fn with_config(&self, config: ClientConfig) -> Self {
        Self {
            transport: self.transport.with_config(config),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_config(self.config().clone().with_timeout(timeout))
    }

    pub fn without_timeout(&self) -> Self {
        self.with_config(self.config().clone().without_timeout())
    }

    pub fn with_compression(&self, enabled: bool) -> Self {
        self.with_config(self.config().clone().with_compression(enabled))
    }

    pub fn with_auth(&self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_config(self.config().clone().with_credentials(username, password))
    }

    pub fn without_auth(&self) -> Self {
        self.with_config(self.config().clone().without_credentials())
    }

    // ── Rendering ──────────────────────────────────────────────────

    /// Render a typed request, a [`RenderPayload`], or a JSON value.
    pub async fn render(&self, request: impl Into<RenderPayload>) -> Result<Report> {
        self.execute_render(request.into(), None).await
    }

    /// Like [`render`](Self::render), aborting when `cancel` fires.
    ///
    /// Cancellation and the configured timeout produce the same
    /// [`ReportError::Cancelled`].
    pub async fn render_cancellable(
        &self,
        request: impl Into<RenderPayload>,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        self.execute_render(request.into(), Some(cancel)).await
    }

    /// Render a stored template by short id with serializable data.
    pub async fn render_by_shortid(
        &self,
        shortid: impl Into<String>,
        data: &impl Serialize,
    ) -> Result<Report> {
        self.render(RenderPayload::by_shortid(shortid, data)?).await
    }

    /// Render a stored template by short id with data given as JSON text.
    pub async fn render_by_shortid_json(
        &self,
        shortid: impl Into<String>,
        json: impl Into<String>,
    ) -> Result<Report> {
        self.render(RenderPayload::by_shortid_json(shortid, json)).await
    }

    /// Render a stored template by name with serializable data.
    pub async fn render_by_name(
        &self,
        name: impl Into<String>,
        data: &impl Serialize,
    ) -> Result<Report> {
        self.render(RenderPayload::by_name(name, data)?).await
    }

    pub async fn render_by_name_json(
        &self,
        name: impl Into<String>,
        json: impl Into<String>,
    ) -> Result<Report> {
        self.render(RenderPayload::by_name_json(name, json)).await
    }

    /// Render from any serializable object shaped like a render request.
    pub async fn render_value(&self, request: &impl Serialize) -> Result<Report> {
        self.render(RenderPayload::from_value(request)?).await
    }

    async fn execute_render(
        &self,
        payload: RenderPayload,
        cancel: Option<&CancellationToken>,
    ) -> Result<Report> {
        // Serialization problems fail here, before anything is sent.
        let body = payload.to_json()?;
        debug!("render request: {} bytes", body.len());

        let scope = self.transport.scope(cancel);
        let response = self.transport.post_json(RENDER_PATH, body, &scope).await?;
        scope.run(interpret_render(response, &scope)).await
    }

    // ── Server information ─────────────────────────────────────────

    /// Names of the recipes registered on the server.
    pub async fn list_recipes(&self) -> Result<Vec<String>> {
        self.get_json(RECIPES_PATH).await
    }

    /// Names of the engines registered on the server.
    pub async fn list_engines(&self) -> Result<Vec<String>> {
        self.get_json(ENGINES_PATH).await
    }

    /// Server package version, e.g. `2.11.0`.
    pub async fn server_version(&self) -> Result<String> {
        let scope = self.transport.scope(None);
        let response = self.transport.get(VERSION_PATH, &scope).await?;
        scope
            .run(async {
                let version = response.error_for_status()?.text().await?;
                Ok::<_, ReportError>(version)
            })
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let scope = self.transport.scope(None);
        let response = self.transport.get(path, &scope).await?;
        scope
            .run(async {
                let value = response.error_for_status()?.json::<T>().await?;
                Ok::<_, ReportError>(value)
            })
            .await
    }
}

impl ReportingApi for ReportingService {
    fn render_payload(
        &self,
        payload: RenderPayload,
        cancel: Option<CancellationToken>,
    ) -> ApiFuture<'_, Report> {
        Box::pin(async move { self.execute_render(payload, cancel.as_ref()).await })
    }

    fn list_recipes(&self) -> ApiFuture<'_, Vec<String>> {
        Box::pin(ReportingService::list_recipes(self))
    }

    fn list_engines(&self) -> ApiFuture<'_, Vec<String>> {
        Box::pin(ReportingService::list_engines(self))
    }

    fn server_version(&self) -> ApiFuture<'_, String> {
        Box::pin(ReportingService::server_version(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_leave_original_untouched() {
        let service = ReportingService::with_credentials("http://localhost:5488", "admin", "pw")
            .unwrap();
        let anonymous = service.without_auth().with_compression(true);

        assert_eq!(service.config().username.as_deref(), Some("admin"));
        assert!(!service.config().compression);
        assert!(anonymous.config().username.is_none());
        assert!(anonymous.config().compression);

        let bounded = service.with_timeout(Duration::from_millis(50));
        assert_eq!(bounded.config().timeout, Some(Duration::from_millis(50)));
        assert!(bounded.without_timeout().config().timeout.is_none());
    }

    #[test]
    fn service_is_usable_as_trait_object() {
        let service = ReportingService::new("http://localhost:5488").unwrap();
        let api: Box<dyn ReportingApi> = Box::new(service);
        drop(api);
    }

    #[tokio::test]
    async fn serialization_errors_are_local() {
        // Nothing listens on port 9; a network attempt would be Http, not InvalidRequest.
        let service = ReportingService::new("http://127.0.0.1:9").unwrap();
        let err = service
            .render(RenderRequest::new(Template::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidRequest(_)));

        let err = service
            .render_by_shortid_json("abc", "{oops")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Serialization(_)));
    }

    #[tokio::test]
    async fn connection_failures_are_plain_network_errors() {
        let service = ReportingService::new("http://127.0.0.1:9").unwrap();
        let err = service.server_version().await.unwrap_err();
        assert!(matches!(err, ReportError::Http(_)));
    }
}

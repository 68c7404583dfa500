//! In-process stand-in for a jsreport server.
//!
//! `jsreport-local` speaks the subset of the jsreport HTTP API that
//! `jsreport-client` uses, backed by toy engines and recipes. It exists so
//! the client can be tested end to end without a Node.js installation, and
//! it doubles as a small development server through the `jsreport-local`
//! binary.
//!
//! ```ignore
//! use jsreport_local::LocalReporting;
//!
//! let server = LocalReporting::new()
//!     .authenticated("admin", "password")
//!     .start()
//!     .await?;
//! println!("serving on {}", server.uri());
//! // ... exercise the client ...
//! let seen = server.requests();
//! server.stop().await;
//! ```

mod api;
pub mod engine;
mod server;

pub use engine::StoredTemplate;

use std::net::SocketAddr;
use std::sync::PoisonError;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use api::{AppState, Settings};

/// Version string reported by `GET /api/version`.
pub const SERVER_VERSION: &str = "2.11.0";

/// A render request as the server received it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    /// `Content-Encoding` header of the request, if any.
    pub content_encoding: Option<String>,
    /// Raw `Authorization` header, if any.
    pub authorization: Option<String>,
    /// Decoded JSON body.
    pub body: Value,
}

/// Builder for a local server.
#[derive(Clone, Debug)]
pub struct LocalReporting {
    bind_addr: SocketAddr,
    credentials: Option<(String, String)>,
    render_delay: Duration,
    render_timeout: Duration,
    stall_body: Duration,
    templates: Vec<StoredTemplate>,
}

impl Default for LocalReporting {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            credentials: None,
            render_delay: Duration::ZERO,
            render_timeout: Duration::from_secs(30),
            stall_body: Duration::ZERO,
            templates: Vec::new(),
        }
    }
}

impl LocalReporting {
    /// Unauthenticated server on a random loopback port.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Require Basic auth with these credentials on every endpoint.
    pub fn authenticated(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sleep this long inside every render.
    pub fn render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Server-side render limit. A render whose delay exceeds it fails with
    /// `500 Timeout during render`.
    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    /// Send the first half of every report body, then pause this long
    /// before the rest.
    pub fn stall_body(mut self, pause: Duration) -> Self {
        self.stall_body = pause;
        self
    }

    /// Store a template addressable by short id and name.
    pub fn with_template(mut self, template: StoredTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_templates(mut self, templates: impl IntoIterator<Item = StoredTemplate>) -> Self {
        self.templates.extend(templates);
        self
    }

    /// Bind the listener and start serving on a Tokio task.
    pub async fn start(self) -> std::io::Result<LocalServer> {
        let state = AppState::new(Settings {
            credentials: self.credentials,
            render_delay: self.render_delay,
            render_timeout: self.render_timeout,
            stall_body: self.stall_body,
            templates: self.templates,
            version: SERVER_VERSION.to_string(),
        });
        let router = server::build_router(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (addr, handle) = server::start_server(router, self.bind_addr, shutdown_rx).await?;

        Ok(LocalServer {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

/// A running local server. Dropping it requests shutdown.
pub struct LocalServer {
    addr: SocketAddr,
    state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl LocalServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URI to hand to a client, e.g. `http://127.0.0.1:41234`.
    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Render requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Shut down gracefully and wait for in-flight requests to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for LocalServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

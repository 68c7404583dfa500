//! Connection configuration for a [`ReportingService`](crate::ReportingService).
//!
//! A [`ClientConfig`] is an immutable value. Changing credentials, timeout,
//! or compression produces a new config (and, through the service's `with_*`
//! methods, a new service handle sharing the same connection pool), so an
//! in-flight call never observes a half-updated configuration.
//!
//! # Examples
//!
//! ```ignore
//! let config = ClientConfig::new("http://localhost:5488")?
//!     .with_credentials("admin", "password")
//!     .with_compression(true)
//!     .with_timeout(Duration::from_secs(30));
//! ```

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{ReportError, Result};

/// Environment variable holding the service URI.
pub const ENV_URL: &str = "JSREPORT_URL";
pub const ENV_USERNAME: &str = "JSREPORT_USERNAME";
pub const ENV_PASSWORD: &str = "JSREPORT_PASSWORD";
pub const ENV_COMPRESSION: &str = "JSREPORT_COMPRESSION";
/// Timeout in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "JSREPORT_TIMEOUT_MS";

/// Client-side configuration of a reporting server connection.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawClientConfig")]
pub struct ClientConfig {
    /// Base address of the server. Always ends with `/`.
    pub service_uri: Url,
    /// Enables Basic authentication when set.
    pub username: Option<String>,
    pub password: Option<String>,
    /// Gzip the render request body.
    pub compression: bool,
    /// Overall time limit per call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl ClientConfig {
    /// Parse `service_uri` and build a config with defaults.
    pub fn new(service_uri: &str) -> Result<Self> {
        Ok(Self {
            service_uri: normalize_base(Url::parse(service_uri)?),
            username: None,
            password: None,
            compression: false,
            timeout: None,
            user_agent: default_user_agent(),
        })
    }

    /// Read the configuration from `JSREPORT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let uri = lookup(ENV_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ReportError::Config(format!("{ENV_URL} is not set")))?;
        let mut config = Self::new(uri.trim())?;

        if let Some(username) = lookup(ENV_USERNAME) {
            config = config.with_credentials(username, lookup(ENV_PASSWORD).unwrap_or_default());
        }
        if let Some(flag) = lookup(ENV_COMPRESSION) {
            config.compression = parse_flag(&flag).ok_or_else(|| {
                ReportError::Config(format!("{ENV_COMPRESSION} is not a boolean: {flag:?}"))
            })?;
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                ReportError::Config(format!("{ENV_TIMEOUT_MS} is not a number: {ms:?}"))
            })?;
            config.timeout = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }

    /// Set Basic-auth credentials. An empty password is still sent.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Drop any configured credentials.
    pub fn without_credentials(mut self) -> Self {
        self.username = None;
        self.password = None;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Resolve an API path such as `api/report` against the service URI.
    ///
    /// Paths are joined relatively, so a base of `http://host/reporting/`
    /// yields `http://host/reporting/api/report`.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.service_uri.join(path.trim_start_matches('/'))?)
    }

    /// `user:password` pair for the Authorization header, if credentials are set.
    pub(crate) fn basic_credentials(&self) -> Option<String> {
        self.username.as_ref().map(|user| {
            format!("{user}:{}", self.password.as_deref().unwrap_or_default())
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("service_uri", &self.service_uri.as_str())
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("compression", &self.compression)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Serialized shape accepted inside a host application's config file.
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawClientConfig {
    service_uri: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    compression: bool,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(default)]
    user_agent: Option<String>,
}

impl TryFrom<RawClientConfig> for ClientConfig {
    type Error = ReportError;

    fn try_from(raw: RawClientConfig) -> Result<Self> {
        let mut config = ClientConfig::new(&raw.service_uri)?;
        config.username = raw.username;
        config.password = raw.password;
        config.compression = raw.compression;
        config.timeout = raw.timeout_ms.map(Duration::from_millis);
        if let Some(user_agent) = raw.user_agent {
            config.user_agent = user_agent;
        }
        Ok(config)
    }
}

fn default_user_agent() -> String {
    format!("jsreport-client/{}", env!("CARGO_PKG_VERSION"))
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

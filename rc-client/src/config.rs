//! Client configuration.
//!
//! Values come from `SZ_RC_CLIENT_*` environment variables (falling back to
//! the same names without the `SZ_` prefix) and can be overridden with the
//! builder methods.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ClientError;

/// Default server port.
pub const DEFAULT_PORT: u16 = 4515;

/// Header carrying the signed authorization value.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Prefix of the deployed variable names. The unprefixed name is read when
/// the prefixed one is unset.
pub const ENV_PREFIX: &str = "SZ_";

/// Server host name.
pub const ENV_HOST: &str = "SZ_RC_CLIENT_HOST";
/// Server port.
pub const ENV_PORT: &str = "SZ_RC_CLIENT_PORT";
/// Directory holding key files.
pub const ENV_KEY_DIR: &str = "SZ_RC_CLIENT_KEY_DIR";
/// Name of the key used to sign.
pub const ENV_KEY_NAME: &str = "SZ_RC_CLIENT_KEY_NAME";
/// Retry budget for failed opens.
pub const ENV_RETRY: &str = "SZ_RC_CLIENT_RETRY";

/// Options handed to the transport on every open.
#[derive(Clone)]
pub struct TransportOptions {
    headers: BTreeMap<String, String>,
    /// Accept self-signed or otherwise unverifiable server certificates.
    pub accept_invalid_certs: bool,
    /// Give up on an open that takes longer than this. `None` waits for the
    /// transport's own timeout.
    pub connect_timeout: Option<Duration>,
}

impl TransportOptions {
    /// Current authorization header, if one has been set.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION_HEADER)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Replace the authorization header.
    pub fn set_authorization(&mut self, value: impl Into<String>) {
        self.headers.insert(AUTHORIZATION_HEADER.to_string(), value.into());
    }

    /// Add or replace an extra handshake header.
    ///
    /// Names are stored lower-case.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// All headers sent with the handshake.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(AUTHORIZATION_HEADER.to_string(), String::new());
        Self {
            headers,
            accept_invalid_certs: true,
            connect_timeout: None,
        }
    }
}

impl fmt::Debug for TransportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportOptions")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Configuration for a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host. Required before connecting.
    pub host: Option<String>,
    /// Server port.
    pub port: u16,
    /// Directory holding key files.
    pub key_dir: PathBuf,
    /// Name of the signing key.
    pub key_name: String,
    /// Number of extra opens allowed when a socket fails to open. 0 never retries.
    pub retry: u32,
    /// Options passed to the transport.
    pub transport: TransportOptions,
    /// Allow `ws://` (for localhost development only).
    pub insecure_dev: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            key_dir: PathBuf::new(),
            key_name: String::new(),
            retry: 0,
            transport: TransportOptions::default(),
            insecure_dev: false,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from `SZ_RC_CLIENT_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the port or retry variable is not a valid number.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// Each `SZ_`-prefixed name falls back to its unprefixed form.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            lookup(name).or_else(|| {
                name.strip_prefix(ENV_PREFIX)
                    .and_then(|short| lookup(short))
            })
        };
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.is_empty()) {
            config.host = Some(host);
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ClientError::config(format!("{ENV_PORT} is not a port: {port:?}")))?;
        }
        if let Some(dir) = lookup(ENV_KEY_DIR) {
            config.key_dir = PathBuf::from(dir);
        }
        if let Some(name) = lookup(ENV_KEY_NAME) {
            config.key_name = name;
        }
        if let Some(retry) = lookup(ENV_RETRY) {
            config.retry = retry.trim().parse().map_err(|_| {
                ClientError::config(format!("{ENV_RETRY} is not a retry count: {retry:?}"))
            })?;
        }

        Ok(config)
    }

    /// Set the server host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the key directory.
    pub fn with_key_dir(mut self, key_dir: impl Into<PathBuf>) -> Self {
        self.key_dir = key_dir.into();
        self
    }

    /// Set the key name.
    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    /// Set the retry budget.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// Fail an open that takes longer than `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.transport.connect_timeout = Some(timeout);
        self
    }

    /// Require a verifiable server certificate.
    pub fn with_verified_tls(mut self) -> Self {
        self.transport.accept_invalid_certs = false;
        self
    }

    /// Send an extra header with every handshake.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.transport.set_header(name, value);
        self
    }

    /// Allow insecure ws:// connections (for localhost development only).
    ///
    /// # Security Warning
    ///
    /// This disables transport encryption. Only use for local testing.
    pub fn with_insecure_dev(mut self) -> Self {
        self.insecure_dev = true;
        self
    }

    /// Server URL, `wss://host:port` (or `ws://` in insecure dev mode).
    ///
    /// # Errors
    ///
    /// Returns `Config` if no host is set.
    pub fn url(&self) -> Result<String, ClientError> {
        let host = self
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::config("no host configured"))?;
        let scheme = if self.insecure_dev { "ws" } else { "wss" };

        // Bare IPv6 literals need brackets.
        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("{scheme}://[{host}]:{}", self.port))
        } else {
            Ok(format!("{scheme}://{host}:{}", self.port))
        }
    }
}

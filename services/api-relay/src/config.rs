//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The initial access token is loaded from the RELAY_ACCESS_TOKEN env var or
//! access_token_file, never stored in the TOML directly to avoid leaking it.

use auth_pipeline::AuthSettings;
use common::Secret;
use serde::Deserialize;
use session_auth::{CSRF_HEADER, CSRF_MISMATCH_MARKER, CSRF_PATH, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding an access token to seed the session with
pub const ACCESS_TOKEN_ENV: &str = "RELAY_ACCESS_TOKEN";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub relay: RelayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Listener and upstream settings
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
    /// Path to a file containing an access token (alternative to RELAY_ACCESS_TOKEN)
    #[serde(default)]
    pub access_token_file: Option<PathBuf>,
}

/// Auth endpoint overrides. Every field defaults to the API's own values.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub refresh_path: String,
    pub csrf_path: String,
    pub login_path: String,
    pub logout_path: String,
    pub csrf_header: String,
    pub csrf_marker: String,
    /// Longest a relayed request waits on a refresh before failing with 504
    pub refresh_wait_secs: Option<u64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: REFRESH_PATH.into(),
            csrf_path: CSRF_PATH.into(),
            login_path: LOGIN_PATH.into(),
            logout_path: LOGOUT_PATH.into(),
            csrf_header: CSRF_HEADER.into(),
            csrf_marker: CSRF_MISMATCH_MARKER.into(),
            refresh_wait_secs: None,
        }
    }
}

impl AuthConfig {
    pub fn to_settings(&self) -> AuthSettings {
        AuthSettings {
            refresh_path: self.refresh_path.clone(),
            csrf_path: self.csrf_path.clone(),
            login_path: self.login_path.clone(),
            logout_path: self.logout_path.clone(),
            csrf_header: self.csrf_header.clone(),
            csrf_marker: self.csrf_marker.clone(),
            refresh_wait: self.refresh_wait_secs.map(Duration::from_secs),
        }
    }

    fn validate(&self) -> common::Result<()> {
        for (name, path) in [
            ("refresh_path", &self.refresh_path),
            ("csrf_path", &self.csrf_path),
            ("login_path", &self.login_path),
            ("logout_path", &self.logout_path),
        ] {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {path}"
                )));
            }
        }
        if transport::HeaderName::from_bytes(self.csrf_header.as_bytes()).is_err() {
            return Err(common::Error::Config(format!(
                "csrf_header is not a valid header name: {}",
                self.csrf_header
            )));
        }
        if self.csrf_marker.is_empty() {
            return Err(common::Error::Config("csrf_marker must not be empty".into()));
        }
        if self.refresh_wait_secs == Some(0) {
            return Err(common::Error::Config(
                "refresh_wait_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    256
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Access token resolution order:
    /// 1. RELAY_ACCESS_TOKEN env var
    /// 2. access_token_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.relay.upstream_url.starts_with("http://")
            && !config.relay.upstream_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "upstream_url must start with http:// or https://, got: {}",
                config.relay.upstream_url
            )));
        }

        if config.relay.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.relay.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        config.auth.validate()?;

        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.relay.access_token = Some(Secret::new(token.trim().to_owned()));
            }
        } else if let Some(ref token_file) = config.relay.access_token_file {
            let token = std::fs::read_to_string(token_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read access_token_file {}: {e}",
                    token_file.display()
                ))
            })?;
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.relay.access_token = Some(Secret::new(token));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("meal-api-relay.toml")
    }
}

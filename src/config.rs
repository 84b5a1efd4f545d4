//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::orchestrator::event_buffer::DEFAULT_CAPACITY;
use crate::{AppError, Result};

/// Session lifecycle and stream tuning.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct SessionConfig {
    /// Events retained per session for resumption.
    pub buffer_capacity: usize,
    /// Detached sessions quiet for longer than this are evicted.
    pub idle_timeout_seconds: u64,
    /// How often the idle sweeper runs.
    pub sweep_interval_seconds: u64,
    /// Interval between stream keepalive comments.
    pub keepalive_seconds: u64,
    /// Also append every request's response to the session stream.
    pub mirror_responses_to_stream: bool,
    /// Send legacy `endpoint` / `session` events when a stream opens.
    pub legacy_session_events: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: DEFAULT_CAPACITY,
            idle_timeout_seconds: 600,
            sweep_interval_seconds: 30,
            keepalive_seconds: 30,
            mirror_responses_to_stream: true,
            legacy_session_events: false,
        }
    }
}

impl SessionConfig {
    /// Idle timeout as a [`Duration`].
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Keepalive interval as a [`Duration`].
    #[must_use]
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_seconds)
    }
}

/// Identity reported by `/health` and `/info`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct ServerInfoConfig {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// One-line description.
    pub description: String,
    /// Deployment region.
    pub region: String,
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: env!("CARGO_PKG_DESCRIPTION").into(),
            region: "us-east-1".into(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Listen host.
    pub host: String,
    /// Listen port; `0` lets the OS choose.
    pub port: u16,
    /// Path of the MCP endpoint.
    pub endpoint: String,
    /// Shared API key; authentication is disabled when absent or empty.
    pub api_key: Option<String>,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Session lifecycle settings.
    pub session: SessionConfig,
    /// Service identity.
    pub server_info: ServerInfoConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            endpoint: "/mcp".into(),
            api_key: None,
            log_level: "info".into(),
            session: SessionConfig::default(),
            server_info: ServerInfoConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MCP_HOST`, `MCP_PORT`, `MCP_API_KEY`, `MCP_LOG_LEVEL` and
    /// `AWS_REGION` from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override is invalid.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then re-validate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an override is invalid.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("MCP_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("MCP_PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|err| AppError::Config(format!("MCP_PORT invalid: {err}")))?;
        }
        if let Some(key) = lookup("MCP_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(level) = lookup("MCP_LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.server_info.region = region;
        }
        self.validate()
    }

    /// Whether requests must present the API key.
    #[must_use]
    pub fn auth_enabled(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }

    /// Check invariants after fields were set directly.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }
        if !self.endpoint.starts_with('/') || self.endpoint.len() < 2 {
            return Err(AppError::Config(
                "endpoint must be an absolute path such as /mcp".into(),
            ));
        }
        if matches!(self.endpoint.as_str(), "/health" | "/info") {
            return Err(AppError::Config(format!(
                "endpoint {} collides with an auxiliary route",
                self.endpoint
            )));
        }
        let session = &self.session;
        for (name, is_zero) in [
            ("buffer_capacity", session.buffer_capacity == 0),
            ("idle_timeout_seconds", session.idle_timeout_seconds == 0),
            ("sweep_interval_seconds", session.sweep_interval_seconds == 0),
            ("keepalive_seconds", session.keepalive_seconds == 0),
        ] {
            if is_zero {
                return Err(AppError::Config(format!(
                    "session.{name} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

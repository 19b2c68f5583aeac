//! Configuration management for the outpost
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{OutpostError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

/// Path the authorization flow is started from
pub const AUTH_START_PATH: &str = "/outpost/auth/start";

/// Path the identity provider redirects back to
pub const AUTH_CALLBACK_PATH: &str = "/outpost/auth/callback";

/// Forward-auth check path queried by the edge proxy
pub const AUTH_CHECK_PATH: &str = "/outpost/auth/check";

/// Main configuration structure for the outpost
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the main HTTP listener binds to
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Diagnostics server configuration
    #[serde(default)]
    pub debug: DebugConfig,

    /// Session store configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Protected applications served by this outpost
    #[serde(default)]
    pub applications: Vec<ApplicationConfig>,
}

fn default_listen() -> String {
    "0.0.0.0:9000".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON formatted log lines
    #[serde(default)]
    pub json_format: bool,

    /// Optional file that receives a copy of every log line
    #[serde(default)]
    pub file_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

/// Diagnostics server configuration
///
/// The diagnostics listener is separate from the main listener and is only
/// started when `enabled` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Start the diagnostics server
    #[serde(default)]
    pub enabled: bool,

    /// Address the diagnostics server binds to
    #[serde(default = "default_debug_listen")]
    pub listen: String,
}

fn default_debug_listen() -> String {
    "127.0.0.1:9901".to_string()
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_debug_listen(),
        }
    }
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Lifetime of sessions saved without an explicit max-age (seconds)
    #[serde(default = "default_session_max_age")]
    pub default_max_age_seconds: i64,

    /// Period of the sweep that deletes expired sessions (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_session_max_age() -> i64 {
    86_400
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_max_age_seconds: default_session_max_age(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// How the outpost sits in front of an application
///
/// The mode decides which rule validates post-login redirect targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProxyMode {
    /// The outpost terminates the connection and reverse-proxies
    Proxy,
    /// Forward-auth for a single externally routed host
    ForwardSingle,
    /// Forward-auth shared across every host under a cookie domain
    ForwardDomain,
}

impl std::fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ProxyMode::Proxy => "proxy",
            ProxyMode::ForwardSingle => "forward_single",
            ProxyMode::ForwardDomain => "forward_domain",
        };
        f.write_str(name)
    }
}

/// Configuration of one protected application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Unique application name
    pub name: String,

    /// Operating mode
    pub mode: ProxyMode,

    /// Public base URL the outpost presents for this application
    pub external_host: String,

    /// Domain session cookies are scoped to; required for `forward_domain`
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Secret used to sign state tokens
    pub cookie_secret: String,

    /// Session cookie name; defaults to `outpost_session_<name>`
    #[serde(default)]
    pub session_name: Option<String>,

    /// OpenID provider client settings
    pub provider: ProviderConfig,

    /// Upper bound on a single code redemption (seconds)
    #[serde(default = "default_redeem_timeout")]
    pub redeem_timeout_seconds: u64,
}

fn default_redeem_timeout() -> u64 {
    5
}

impl ApplicationConfig {
    /// Name of the session cookie for this application
    pub fn session_name(&self) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("outpost_session_{}", self.name))
    }

    /// Redirect URI registered with the provider
    ///
    /// Falls back to the callback path under the external host.
    pub fn redirect_uri(&self) -> String {
        match &self.provider.redirect_uri {
            Some(uri) => uri.clone(),
            None => format!(
                "{}{}",
                self.external_host.trim_end_matches('/'),
                AUTH_CALLBACK_PATH
            ),
        }
    }

    /// Whether session cookies must carry the `Secure` attribute
    pub fn is_secure(&self) -> bool {
        self.external_host.starts_with("https://")
    }
}

/// OpenID provider client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Issuer identifier; discovery is performed against it
    pub issuer: String,

    /// OAuth client identifier
    pub client_id: String,

    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,

    /// Redirect URI override
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Scopes requested at the authorization endpoint
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Authorization endpoint; discovered when absent
    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint; discovered when absent
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// JWKS endpoint; discovered when absent
    #[serde(default)]
    pub jwks_uri: Option<String>,
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
    ]
}

impl ProviderConfig {
    /// Whether every endpoint is configured and discovery can be skipped
    pub fn is_fully_configured(&self) -> bool {
        self.authorization_endpoint.is_some()
            && self.token_endpoint.is_some()
            && self.jwks_uri.is_some()
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            listen: default_listen(),
            logging: LoggingConfig::default(),
            debug: DebugConfig::default(),
            session: SessionConfig::default(),
            applications: Vec::new(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OutpostError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| OutpostError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(listen) = std::env::var("OUTPOST_LISTEN") {
            tracing::debug!(listen = %listen, "Env override: OUTPOST_LISTEN");
            self.listen = listen;
        }

        if let Ok(level) = std::env::var("OUTPOST_LOG_LEVEL") {
            tracing::debug!(level = %level, "Env override: OUTPOST_LOG_LEVEL");
            self.logging.level = level;
        }

        if let Ok(json_logs) = std::env::var("OUTPOST_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => {
                    self.logging.json_format = v;
                    tracing::debug!(json_logs = v, "Env override: OUTPOST_JSON_LOGS");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for OUTPOST_JSON_LOGS: {}", json_logs);
                }
            }
        }

        if let Ok(debug_flag) = std::env::var("OUTPOST_DEBUG") {
            match debug_flag.parse::<bool>() {
                Ok(v) => {
                    self.debug.enabled = v;
                    tracing::debug!(enabled = v, "Env override: OUTPOST_DEBUG");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for OUTPOST_DEBUG: {}", debug_flag);
                }
            }
        }

        if let Ok(debug_listen) = std::env::var("OUTPOST_DEBUG_LISTEN") {
            tracing::debug!(listen = %debug_listen, "Env override: OUTPOST_DEBUG_LISTEN");
            self.debug.listen = debug_listen;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
            self.logging.level = "debug".to_string();
        }

        if let crate::cli::Commands::Serve {
            listen: Some(listen),
        } = &cli.command
        {
            self.listen = listen.clone();
        }
    }

    /// Validate the configuration
    ///
    /// Ensures listen addresses parse, every application has a usable
    /// external host, secrets, and provider settings, and that
    /// `forward_domain` applications carry a cookie domain.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(
                OutpostError::Config(format!("Invalid listen address: {}", self.listen)).into(),
            );
        }

        if self.debug.enabled && self.debug.listen.parse::<SocketAddr>().is_err() {
            return Err(OutpostError::Config(format!(
                "Invalid debug listen address: {}",
                self.debug.listen
            ))
            .into());
        }

        if self.logging.level.is_empty() {
            return Err(OutpostError::Config("logging.level cannot be empty".to_string()).into());
        }

        if self.session.default_max_age_seconds <= 0 {
            return Err(OutpostError::Config(
                "session.default_max_age_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.cleanup_interval_seconds == 0 {
            return Err(OutpostError::Config(
                "session.cleanup_interval_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        let mut names = HashSet::new();
        for app in &self.applications {
            if app.name.is_empty() {
                return Err(
                    OutpostError::Config("Application name cannot be empty".to_string()).into(),
                );
            }
            if !names.insert(app.name.as_str()) {
                return Err(OutpostError::Config(format!(
                    "Duplicate application name: {}",
                    app.name
                ))
                .into());
            }
            validate_application(app)?;
        }

        Ok(())
    }
}

fn validate_application(app: &ApplicationConfig) -> Result<()> {
    let external = Url::parse(&app.external_host).map_err(|e| {
        OutpostError::Config(format!(
            "{}: invalid external_host {}: {}",
            app.name, app.external_host, e
        ))
    })?;
    if !matches!(external.scheme(), "http" | "https") || external.host_str().is_none() {
        return Err(OutpostError::Config(format!(
            "{}: external_host must be an absolute http(s) URL",
            app.name
        ))
        .into());
    }

    if app.mode == ProxyMode::ForwardDomain
        && app
            .cookie_domain
            .as_deref()
            .map_or(true, |d| d.trim_start_matches('.').is_empty())
    {
        return Err(OutpostError::Config(format!(
            "{}: cookie_domain is required in forward_domain mode",
            app.name
        ))
        .into());
    }

    if app.cookie_secret.is_empty() {
        return Err(
            OutpostError::Config(format!("{}: cookie_secret cannot be empty", app.name)).into(),
        );
    }

    if app.provider.client_id.is_empty() {
        return Err(OutpostError::Config(format!(
            "{}: provider.client_id cannot be empty",
            app.name
        ))
        .into());
    }

    Url::parse(&app.provider.issuer).map_err(|e| {
        OutpostError::Config(format!(
            "{}: invalid provider.issuer {}: {}",
            app.name, app.provider.issuer, e
        ))
    })?;

    let endpoints = [
        ("provider.redirect_uri", Some(app.redirect_uri())),
        (
            "provider.authorization_endpoint",
            app.provider.authorization_endpoint.clone(),
        ),
        ("provider.token_endpoint", app.provider.token_endpoint.clone()),
        ("provider.jwks_uri", app.provider.jwks_uri.clone()),
    ];
    for (field, value) in endpoints {
        if let Some(value) = value {
            Url::parse(&value).map_err(|e| {
                OutpostError::Config(format!("{}: invalid {} {}: {}", app.name, field, value, e))
            })?;
        }
    }

    if app.redeem_timeout_seconds == 0 {
        return Err(OutpostError::Config(format!(
            "{}: redeem_timeout_seconds must be greater than 0",
            app.name
        ))
        .into());
    }

    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

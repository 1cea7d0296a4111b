//! Configuration schema for the dashboard.
//!
//! The file is TOML. Every section except `[providers]` has defaults, so a
//! minimal configuration only needs a secret key and one provider.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "configuration.toml";

/// Minimum accepted length for `secret_key`.
pub const MIN_SECRET_KEY_LEN: usize = 16;

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Signs the session cookie. Never logged.
    pub secret_key: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// Authentication providers keyed by the name used in `/login/<name>`.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally visible base URL. Falls back to `http://{host}:{port}`.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

impl ServerConfig {
    /// Base URL used for the login/logout button targets and OAuth callbacks.
    pub fn base_url(&self) -> String {
        match self.public_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8050
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. `~` is expanded.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).into_owned())
    }
}

fn default_database_path() -> String {
    "dashpass.db".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
    /// Live sessions kept in memory; the least recently used is evicted
    /// beyond this.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_cookie_name() -> String {
    "dashpass_session".into()
}

fn default_session_ttl_secs() -> u64 {
    24 * 3600
}

fn default_max_sessions() -> usize {
    10_000
}

/// One configured authentication provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Username/password pairs listed in the configuration file.
    Static(StaticProviderConfig),
    /// OAuth2 authorization-code flow against an external identity server.
    Oauth(OAuthProviderConfig),
}

impl ProviderConfig {
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Static(c) => c.title.as_deref(),
            Self::Oauth(c) => c.title.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Static(_) => "static",
            Self::Oauth(_) => "oauth",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticProviderConfig {
    #[serde(default)]
    pub title: Option<String>,
    /// username -> password
    #[serde(default)]
    pub identities: BTreeMap<String, String>,
    /// username -> profile data handed to the identity handler
    #[serde(default)]
    pub identity_data: BTreeMap<String, IdentityDataConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityDataConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub node_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    #[serde(default)]
    pub title: Option<String>,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Userinfo field holding the provider-scoped identifier.
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,
    /// Userinfo field names mapped onto the user record.
    #[serde(default)]
    pub mapping: OAuthFieldMapping,
}

fn default_scope() -> String {
    "openid email profile".into()
}

fn default_identifier_field() -> String {
    "sub".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthFieldMapping {
    #[serde(default = "default_email_field")]
    pub email: String,
    #[serde(default = "default_name_field")]
    pub name: String,
    #[serde(default)]
    pub affiliation: Option<String>,
}

impl Default for OAuthFieldMapping {
    fn default() -> Self {
        Self {
            email: default_email_field(),
            name: default_name_field(),
            affiliation: None,
        }
    }
}

fn default_email_field() -> String {
    "email".into()
}

fn default_name_field() -> String {
    "name".into()
}

impl Config {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.trim().len() < MIN_SECRET_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "secret_key must be at least {MIN_SECRET_KEY_LEN} characters"
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host cannot be empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port cannot be 0".into()));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.cookie_name cannot be empty".into(),
            ));
        }
        if self.session.max_sessions == 0 {
            return Err(ConfigError::Invalid(
                "session.max_sessions must be at least 1".into(),
            ));
        }
        if self.providers.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one entry under [providers] is required".into(),
            ));
        }
        for (name, provider) in &self.providers {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                return Err(ConfigError::Invalid(format!(
                    "provider name '{name}' must be non-empty and use [A-Za-z0-9_-]"
                )));
            }
            if let ProviderConfig::Oauth(oauth) = provider {
                for (field, value) in [
                    ("client_id", &oauth.client_id),
                    ("authorize_url", &oauth.authorize_url),
                    ("token_url", &oauth.token_url),
                    ("userinfo_url", &oauth.userinfo_url),
                    ("identifier_field", &oauth.identifier_field),
                ] {
                    if value.trim().is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "providers.{name}.{field} cannot be empty"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

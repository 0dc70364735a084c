//! Service configuration.
//!
//! Raw settings are deserialized from the layered `config` sources in
//! `service_core::config`; provider entries are then validated once into
//! immutable [`ProviderConfig`] values. Any invalid entry aborts startup.

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "GROUP_SERVICE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct GroupServiceConfig {
    #[serde(default)]
    pub server: core_config::Config,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Scope every bearer token must carry.
    #[serde(default = "default_required_scope")]
    pub required_scope: String,
    #[serde(default)]
    pub providers: Vec<RawProviderConfig>,
    #[serde(default)]
    pub token_validators: Vec<TokenValidatorConfig>,
    #[serde(default)]
    pub decision_cache: DecisionCacheConfig,
}

fn default_service_name() -> String {
    "group-service".to_string()
}

fn default_required_scope() -> String {
    "read".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCredentials {
    pub username: String,
    pub secret: Secret<String>,
}

/// Provider entry exactly as written in the configuration source.
#[derive(Debug, Clone, Deserialize)]
pub struct RawProviderConfig {
    pub kind: String,
    pub url: String,
    pub credentials: RawCredentials,
    pub timeout_ms: u64,
    pub schac_home_organization: String,
    pub name: String,
    #[serde(default)]
    pub supports_get_members: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenValidatorConfig {
    pub name: String,
    pub url: String,
    pub client_id: String,
    pub secret: Secret<String>,
    #[serde(default = "default_validator_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_validator_timeout_ms() -> u64 {
    5000
}

impl TokenValidatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionCacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    #[serde(default = "default_eviction_interval_ms")]
    pub eviction_interval_ms: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    60_000
}

fn default_eviction_interval_ms() -> u64 {
    60_000
}

impl Default for DecisionCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_ms: default_cache_ttl_ms(),
            eviction_interval_ms: default_eviction_interval_ms(),
        }
    }
}

impl DecisionCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown provider kind '{kind}' for provider '{provider}'")]
    UnknownProviderKind { provider: String, kind: String },

    #[error("Provider '{provider}' is missing required field '{field}'")]
    MissingField {
        provider: String,
        field: &'static str,
    },

    #[error("No group providers configured")]
    NoProviders,

    #[error("Provider '{0}' must have a timeout greater than zero")]
    InvalidTimeout(String),

    #[error("Only one authoritative provider may be configured, found: {0:?}")]
    MultipleAuthoritativeProviders(Vec<String>),

    #[error("Token validator '{0}' has no introspection url")]
    MissingValidatorUrl(String),

    #[error("Failed to build HTTP client for '{provider}': {reason}")]
    HttpClient { provider: String, reason: String },
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

/// Backend kinds this service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Internal authoritative registry, spoken to over SOAP.
    Grouper,
    /// External partner exposing the JSON/REST membership API.
    Voot2,
    /// External partner exposing the OpenSocial groups and people collections.
    OpenSocial,
}

impl ProviderKind {
    pub fn is_external(self) -> bool {
        matches!(self, ProviderKind::Voot2 | ProviderKind::OpenSocial)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grouper" => Ok(ProviderKind::Grouper),
            "voot2" => Ok(ProviderKind::Voot2),
            "open_social" | "opensocial" => Ok(ProviderKind::OpenSocial),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Grouper => f.write_str("grouper"),
            ProviderKind::Voot2 => f.write_str("voot2"),
            ProviderKind::OpenSocial => f.write_str("open_social"),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Validated, immutable provider definition. Owned by exactly one provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub url: String,
    pub credentials: Credentials,
    pub timeout: Duration,
    pub schac_home_organization: String,
    pub name: String,
    pub supports_get_members: bool,
}

impl ProviderConfig {
    pub fn new(
        kind: ProviderKind,
        url: &str,
        credentials: Credentials,
        timeout: Duration,
        schac_home_organization: &str,
        name: &str,
        supports_get_members: bool,
    ) -> Result<Self, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::MissingField {
                provider: url.to_string(),
                field: "name",
            });
        }

        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(ConfigError::MissingField {
                provider: name.to_string(),
                field: "url",
            });
        }

        let schac_home_organization = schac_home_organization.trim();
        if schac_home_organization.is_empty() {
            return Err(ConfigError::MissingField {
                provider: name.to_string(),
                field: "schac_home_organization",
            });
        }

        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(name.to_string()));
        }

        Ok(Self {
            kind,
            url: url.to_string(),
            credentials,
            timeout,
            schac_home_organization: schac_home_organization.to_string(),
            name: name.to_string(),
            supports_get_members,
        })
    }

    pub fn is_external(&self) -> bool {
        self.kind.is_external()
    }
}

impl TryFrom<RawProviderConfig> for ProviderConfig {
    type Error = ConfigError;

    fn try_from(raw: RawProviderConfig) -> Result<Self, Self::Error> {
        let kind = raw
            .kind
            .parse::<ProviderKind>()
            .map_err(|kind| ConfigError::UnknownProviderKind {
                provider: raw.name.clone(),
                kind,
            })?;

        ProviderConfig::new(
            kind,
            &raw.url,
            Credentials::new(raw.credentials.username, raw.credentials.secret.expose_secret()),
            Duration::from_millis(raw.timeout_ms),
            &raw.schac_home_organization,
            &raw.name,
            raw.supports_get_members,
        )
    }
}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProviderConfig{{kind={}, url={}, name={}, timeout_ms={}, schac_home_organization={}}}",
            self.kind,
            self.url,
            self.name,
            self.timeout.as_millis(),
            self.schac_home_organization
        )
    }
}

impl GroupServiceConfig {
    /// Load from `$GROUP_SERVICE_CONFIG` when set, otherwise from the default
    /// `configuration` file and `APP__*` variables.
    pub fn load() -> Result<Self, AppError> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => core_config::load_from(&path),
            _ => core_config::load(),
        }
    }

    /// Validate every provider entry. Fails on the first invalid one.
    pub fn provider_configs(&self) -> Result<Vec<ProviderConfig>, ConfigError> {
        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        let configs = self
            .providers
            .iter()
            .cloned()
            .map(ProviderConfig::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let authoritative: Vec<String> = configs
            .iter()
            .filter(|c| !c.is_external())
            .map(|c| c.name.clone())
            .collect();
        if authoritative.len() > 1 {
            return Err(ConfigError::MultipleAuthoritativeProviders(authoritative));
        }

        Ok(configs)
    }

    pub fn validate_token_validators(&self) -> Result<(), ConfigError> {
        for validator in &self.token_validators {
            if validator.url.trim().is_empty() {
                return Err(ConfigError::MissingValidatorUrl(validator.name.clone()));
            }
        }
        Ok(())
    }
}

pub mod grouper;
pub mod mock;
pub mod opensocial;
pub mod rest;

use crate::config::{ConfigError, ProviderConfig, ProviderKind};
use crate::models::{Group, Member};
use crate::utils::urn;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use grouper::GrouperProvider;
pub use mock::{MockProvider, SimulationMode};
pub use opensocial::OpenSocialProvider;
pub use rest::RestGroupProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Backend reported failure: {0}")]
    Backend(String),
}

impl ProviderError {
    /// Short label used for metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProviderError::Timeout(_) => "timeout",
            _ => "error",
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout)
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Connection(err.to_string())
        }
    }
}

/// A group backend.
///
/// Implementations are shared across request tasks behind `Arc<dyn Provider>`
/// and must never block. The routing predicates are pure and are evaluated
/// before any call is made.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    fn schac_home_organization(&self) -> &str;

    /// Upper bound the aggregation engine allows for a single call.
    fn timeout(&self) -> Duration;

    /// External partners sit outside the home institution. The single
    /// non-external provider is authoritative.
    fn is_external_group_provider(&self) -> bool;

    fn supports_getting_members_of_group(&self) -> bool;

    /// Whether a user from `schac_home_organization` may have memberships here.
    fn should_be_queried_for_memberships(&self, schac_home_organization: &str) -> bool;

    /// Whether `group_id` can live in this backend.
    fn should_be_queried_for_group(&self, group_id: &str) -> bool;

    async fn get_group_memberships(&self, uid: &str) -> Result<Vec<Group>, ProviderError>;

    /// `Ok(None)` means the backend answered and the user is not a member.
    async fn get_group_membership(
        &self,
        uid: &str,
        group_id: &str,
    ) -> Result<Option<Group>, ProviderError>;

    async fn get_members_of_group(&self, group_id: &str) -> Result<Vec<Member>, ProviderError>;

    /// Every group known to the backend. Only authoritative backends list.
    async fn get_all_groups(&self) -> Result<Vec<Group>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Routing rule shared by external providers: the group URN must carry
/// exactly the provider's organization.
pub fn external_should_be_queried_for_group(schac_home_organization: &str, group_id: &str) -> bool {
    urn::schac_home_from_group_urn(group_id) == Some(schac_home_organization)
}

/// Routing rule for the authoritative provider: unqualified local names and
/// URNs of its own organization. Malformed URNs never route anywhere.
pub fn authoritative_should_be_queried_for_group(
    schac_home_organization: &str,
    group_id: &str,
) -> bool {
    if urn::is_malformed_group_urn(group_id) {
        return false;
    }
    match urn::schac_home_from_group_urn(group_id) {
        Some(org) => org == schac_home_organization,
        None => true,
    }
}

/// Builds the concrete provider for a validated configuration.
pub fn build_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>, ConfigError> {
    tracing::info!(provider = %config, "Configuring group provider");
    match config.kind {
        ProviderKind::Grouper => Ok(Arc::new(GrouperProvider::new(config)?)),
        ProviderKind::Voot2 => Ok(Arc::new(RestGroupProvider::new(config)?)),
        ProviderKind::OpenSocial => Ok(Arc::new(OpenSocialProvider::new(config)?)),
    }
}

/// One client per provider, with basic credentials and the provider timeout
/// baked in.
pub(crate) fn build_http_client(config: &ProviderConfig) -> Result<Client, ConfigError> {
    let raw = format!(
        "{}:{}",
        config.credentials.username,
        config.credentials.password.expose_secret()
    );
    let mut auth = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(raw))).map_err(
        |e| ConfigError::HttpClient {
            provider: config.name.clone(),
            reason: e.to_string(),
        },
    )?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    Client::builder()
        .default_headers(headers)
        .timeout(config.timeout)
        .connect_timeout(config.timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient {
            provider: config.name.clone(),
            reason: e.to_string(),
        })
}

/// Backends return either a single object or an array where a list is
/// expected. Both decode to a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

pub(crate) fn decode_lenient_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ProviderError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    match serde_json::from_str::<OneOrMany<T>>(body) {
        Ok(OneOrMany::Many(items)) => Ok(items),
        Ok(OneOrMany::One(item)) => Ok(vec![item]),
        Err(e) => Err(ProviderError::Decode(e.to_string())),
    }
}

/// Encodes one path segment. Colons are kept as-is since backends use
/// them inside local group names.
pub(crate) fn encode_path_segment(segment: &str) -> String {
    urlencoding::encode(segment).replace("%3A", ":")
}

use crate::config::{ConfigError, TokenValidatorConfig};
use crate::models::ValidationVerdict;
use crate::utils::urn;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::observability::TracedClientExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

/// One authorization server able to judge bearer tokens.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    fn name(&self) -> &str;

    /// A negative verdict means the server answered and did not accept the
    /// token. Errors mean it could not be asked.
    async fn validate(&self, token: &str) -> Result<ValidationVerdict, ValidatorError>;
}

/// RFC 7662 style introspection: `POST {url}` with form `token=...`,
/// authenticated with the validator's own client id and secret.
pub struct RemoteIntrospectionValidator {
    name: String,
    url: String,
    client_id: String,
    secret: Secret<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Joined(String),
    List(Vec<String>),
}

impl ScopeClaim {
    fn into_scopes(self) -> Vec<String> {
        match self {
            ScopeClaim::Joined(s) => s.split_whitespace().map(str::to_string).collect(),
            ScopeClaim::List(list) => list,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntrospectionResponse {
    #[serde(default)]
    active: bool,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    scope: Option<ScopeClaim>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default, alias = "schacHomeOrganization", alias = "schac_home")]
    schac_home_organization: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
}

impl IntrospectionResponse {
    fn into_verdict(self, issuer: &str) -> ValidationVerdict {
        if !self.active {
            return ValidationVerdict::invalid();
        }

        // Client-credentials tokens carry the client id as subject.
        let principal = self.user_name.or_else(|| {
            self.sub
                .filter(|sub| self.client_id.as_deref() != Some(sub.as_str()))
        });
        let organization = self.schac_home_organization.or_else(|| {
            principal
                .as_deref()
                .and_then(urn::schac_home_from_person_urn)
                .map(str::to_string)
        });

        ValidationVerdict {
            valid: true,
            principal,
            client_id: self.client_id,
            scopes: self.scope.map(ScopeClaim::into_scopes).unwrap_or_default(),
            organization,
            expires_at: self
                .exp
                .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0)),
            issuer: Some(issuer.to_string()),
        }
    }
}

impl RemoteIntrospectionValidator {
    pub fn new(config: &TokenValidatorConfig) -> Result<Self, ConfigError> {
        if config.url.trim().is_empty() {
            return Err(ConfigError::MissingValidatorUrl(config.name.clone()));
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient {
                provider: config.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            name: config.name.clone(),
            url: config.url.trim().to_string(),
            client_id: config.client_id.clone(),
            secret: config.secret.clone(),
            client,
        })
    }
}

#[async_trait]
impl TokenValidator for RemoteIntrospectionValidator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn validate(&self, token: &str) -> Result<ValidationVerdict, ValidatorError> {
        let response = self
            .client
            .traced_post(&self.url)
            .header("Accept", "application/json")
            .basic_auth(&self.client_id, Some(self.secret.expose_secret()))
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| ValidatorError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ValidatorError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| ValidatorError::Decode(e.to_string()))?;

        Ok(body.into_verdict(&self.name))
    }
}

use super::{
    Provider, ProviderError, build_http_client, decode_lenient_list, encode_path_segment,
    external_should_be_queried_for_group,
};
use crate::config::{ConfigError, ProviderConfig};
use crate::models::{Group, Member, MembershipRole};
use crate::utils::urn;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use service_core::observability::TracedClientExt;
use std::time::Duration;

/// External partner exposing the OpenSocial collections:
///
/// - `GET {url}/groups/{uid}` for the groups of a person
/// - `GET {url}/people/@all/{group}` for the members of a group
///
/// Responses wrap their items in an `entry` field. There is no single-group
/// lookup, so membership of one group is answered from the person's list.
pub struct OpenSocialProvider {
    config: ProviderConfig,
    client: Client,
    group_id_prefix: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    entry: Option<Entries<T>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entries<T> {
    Many(Vec<T>),
    One(T),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSocialGroup {
    id: String,
    #[serde(default, alias = "displayName")]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "voot_membership_role")]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSocialPerson {
    id: String,
    #[serde(default, alias = "name")]
    display_name: Option<String>,
}

/// Items of an OpenSocial response. Containers that skip the envelope and
/// return the bare item or list are accepted too. An envelope without
/// `entry` is an empty collection.
fn decode_entries<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, ProviderError> {
    let trimmed = body.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('[') {
        return decode_lenient_list(body);
    }
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    match envelope.entry {
        Some(Entries::Many(items)) => Ok(items),
        Some(Entries::One(item)) => Ok(vec![item]),
        None => Ok(decode_lenient_list(body).unwrap_or_default()),
    }
}

impl OpenSocialProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let client = build_http_client(&config)?;
        let group_id_prefix = urn::group_urn_prefix(&config.schac_home_organization);
        Ok(Self {
            config,
            client,
            group_id_prefix,
        })
    }

    fn to_group(&self, raw: OpenSocialGroup) -> Group {
        let id = if urn::is_fully_qualified_group_name(&raw.id) {
            raw.id.clone()
        } else {
            format!("{}{}", self.group_id_prefix, raw.id)
        };
        let role = raw
            .role
            .as_deref()
            .map_or(MembershipRole::Member, MembershipRole::from_backend);
        Group::new(
            id,
            raw.title.unwrap_or(raw.id),
            raw.description,
            self.config.schac_home_organization.clone(),
            role,
        )
    }

    async fn fetch(&self, url: &str) -> Result<Option<String>, ProviderError> {
        tracing::debug!(provider = %self.config.name, url = %url, "Querying OpenSocial provider");

        let response = self
            .client
            .traced_get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .text()
            .await
            .map(Some)
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout))
    }
}

#[async_trait]
impl Provider for OpenSocialProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn schac_home_organization(&self) -> &str {
        &self.config.schac_home_organization
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }

    fn is_external_group_provider(&self) -> bool {
        true
    }

    fn supports_getting_members_of_group(&self) -> bool {
        self.config.supports_get_members
    }

    fn should_be_queried_for_memberships(&self, schac_home_organization: &str) -> bool {
        self.config.schac_home_organization == schac_home_organization
    }

    fn should_be_queried_for_group(&self, group_id: &str) -> bool {
        external_should_be_queried_for_group(&self.config.schac_home_organization, group_id)
    }

    async fn get_group_memberships(&self, uid: &str) -> Result<Vec<Group>, ProviderError> {
        let url = format!(
            "{}/groups/{}",
            self.config.url,
            encode_path_segment(urn::strip_person_urn_identifier(uid))
        );
        let Some(body) = self.fetch(&url).await? else {
            return Ok(Vec::new());
        };
        let groups: Vec<OpenSocialGroup> = decode_entries(&body)?;
        Ok(groups.into_iter().map(|g| self.to_group(g)).collect())
    }

    async fn get_group_membership(
        &self,
        uid: &str,
        group_id: &str,
    ) -> Result<Option<Group>, ProviderError> {
        let wanted = urn::strip_group_urn_identifier(group_id);
        Ok(self
            .get_group_memberships(uid)
            .await?
            .into_iter()
            .find(|g| urn::strip_group_urn_identifier(&g.id) == wanted))
    }

    async fn get_members_of_group(&self, group_id: &str) -> Result<Vec<Member>, ProviderError> {
        let url = format!(
            "{}/people/@all/{}",
            self.config.url,
            encode_path_segment(urn::strip_group_urn_identifier(group_id))
        );
        let Some(body) = self.fetch(&url).await? else {
            return Ok(Vec::new());
        };
        let people: Vec<OpenSocialPerson> = decode_entries(&body)?;
        Ok(people
            .into_iter()
            .map(|p| {
                let display_name = p.display_name.unwrap_or_else(|| p.id.clone());
                Member::new(p.id, display_name)
            })
            .collect())
    }
}

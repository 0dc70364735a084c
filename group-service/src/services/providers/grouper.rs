//! Authoritative group registry spoken to over SOAP.
//!
//! Requests are small hand-built envelopes; responses are walked with the
//! streaming `quick_xml` reader and only the fields we map are kept.

use super::{
    Provider, ProviderError, authoritative_should_be_queried_for_group, build_http_client,
};
use crate::config::{ConfigError, ProviderConfig};
use crate::models::{Group, Member, MembershipRole};
use crate::utils::urn;
use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use reqwest::Client;
use service_core::observability::TracedClientExt;
use std::collections::HashMap;
use std::time::Duration;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const GROUPER_NS: &str = "http://soap_v2_2.ws.grouper.middleware.internet2.edu/xsd";
const CLIENT_VERSION: &str = "v2_2_000";

pub struct GrouperProvider {
    config: ProviderConfig,
    client: Client,
    group_id_prefix: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct WsGroup {
    name: String,
    display_name: Option<String>,
    display_extension: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct WsMembership {
    group_name: String,
    list_name: Option<String>,
    subject_id: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct WsSubject {
    id: String,
    name: Option<String>,
}

#[derive(Debug, Default)]
struct SoapResults {
    groups: Vec<WsGroup>,
    memberships: Vec<WsMembership>,
    subjects: Vec<WsSubject>,
    success: Option<bool>,
    result_code: Option<String>,
    fault: Option<String>,
}

impl SoapResults {
    fn into_checked(self) -> Result<Self, ProviderError> {
        if let Some(fault) = self.fault {
            return Err(ProviderError::Backend(fault));
        }
        if self.success == Some(false) {
            let code = self.result_code.clone().unwrap_or_default();
            // Lookups of unknown subjects or groups simply have no data.
            if !code.contains("NOT_FOUND") {
                return Err(ProviderError::Backend(code));
            }
        }
        Ok(self)
    }

    /// Highest role per group name, from the membership list names.
    fn roles(&self) -> HashMap<&str, MembershipRole> {
        let mut roles: HashMap<&str, MembershipRole> = HashMap::new();
        for membership in &self.memberships {
            let role = membership
                .list_name
                .as_deref()
                .map_or(MembershipRole::Member, MembershipRole::from_backend);
            roles
                .entry(membership.group_name.as_str())
                .and_modify(|r| *r = (*r).max(role))
                .or_insert(role);
        }
        roles
    }
}

fn parse_soap_results(body: &str) -> Result<SoapResults, ProviderError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut results = SoapResults::default();
    let mut stack: Vec<String> = Vec::new();
    let mut group: Option<WsGroup> = None;
    let mut membership: Option<WsMembership> = None;
    let mut subject: Option<WsSubject> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ProviderError::Decode(format!("Invalid SOAP response: {}", e)))?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "wsGroups" | "groupResults" => group = Some(WsGroup::default()),
                    "wsMemberships" => membership = Some(WsMembership::default()),
                    "wsSubjects" => subject = Some(WsSubject::default()),
                    _ => {}
                }
                stack.push(name);
            }
            Event::End(_) => {
                let Some(name) = stack.pop() else {
                    continue;
                };
                match name.as_str() {
                    "wsGroups" | "groupResults" => results.groups.extend(group.take()),
                    "wsMemberships" => results.memberships.extend(membership.take()),
                    "wsSubjects" => results.subjects.extend(subject.take()),
                    _ => {}
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| ProviderError::Decode(e.to_string()))?
                    .into_owned();
                let len = stack.len();
                if len < 2 {
                    continue;
                }
                let (parent, field) = (stack[len - 2].as_str(), stack[len - 1].as_str());

                match parent {
                    "wsGroups" | "groupResults" => {
                        if let Some(g) = group.as_mut() {
                            match field {
                                "name" => g.name = text,
                                "displayName" => g.display_name = Some(text),
                                "displayExtension" => g.display_extension = Some(text),
                                "description" => g.description = Some(text),
                                _ => {}
                            }
                        }
                    }
                    "wsMemberships" => {
                        if let Some(m) = membership.as_mut() {
                            match field {
                                "groupName" => m.group_name = text,
                                "listName" => m.list_name = Some(text),
                                "subjectId" => m.subject_id = Some(text),
                                _ => {}
                            }
                        }
                    }
                    "wsSubjects" => {
                        if let Some(s) = subject.as_mut() {
                            match field {
                                "id" => s.id = text,
                                "name" => s.name = Some(text),
                                _ => {}
                            }
                        }
                    }
                    "resultMetadata" if subject.is_none() && group.is_none() => match field {
                        "success" => results.success = Some(text == "T"),
                        "resultCode" => results.result_code = Some(text),
                        _ => {}
                    },
                    _ if field == "faultstring" => results.fault = Some(text),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(results)
}

fn envelope(operation: &str, body: &str) -> String {
    format!(
        concat!(
            r#"<soapenv:Envelope xmlns:soapenv="{env}" xmlns:xsd="{ns}">"#,
            "<soapenv:Header/><soapenv:Body><xsd:{op}>",
            "<xsd:clientVersion>{version}</xsd:clientVersion>{body}",
            "</xsd:{op}></soapenv:Body></soapenv:Envelope>"
        ),
        env = SOAP_ENV_NS,
        ns = GROUPER_NS,
        op = operation,
        version = CLIENT_VERSION,
        body = body
    )
}

fn get_memberships_request(subject_id: Option<&str>, group_name: Option<&str>) -> String {
    let mut body = String::new();
    if let Some(group_name) = group_name {
        body.push_str(&format!(
            "<xsd:wsGroupLookups><xsd:groupName>{}</xsd:groupName></xsd:wsGroupLookups>",
            escape(group_name)
        ));
    }
    if let Some(subject_id) = subject_id {
        body.push_str(&format!(
            "<xsd:wsSubjectLookups><xsd:subjectId>{}</xsd:subjectId></xsd:wsSubjectLookups>",
            escape(subject_id)
        ));
    }
    body.push_str(concat!(
        "<xsd:memberFilter>All</xsd:memberFilter>",
        "<xsd:includeGroupDetail>F</xsd:includeGroupDetail>",
        "<xsd:includeSubjectDetail>T</xsd:includeSubjectDetail>",
        "<xsd:enabled>T</xsd:enabled>"
    ));
    envelope("getMemberships", &body)
}

fn find_all_groups_request() -> String {
    envelope(
        "findGroups",
        concat!(
            "<xsd:wsQueryFilter>",
            "<xsd:queryFilterType>FIND_BY_STEM_NAME</xsd:queryFilterType>",
            "<xsd:stemName>:</xsd:stemName>",
            "<xsd:stemNameScope>ALL_IN_SUBTREE</xsd:stemNameScope>",
            "</xsd:wsQueryFilter>",
            "<xsd:includeGroupDetail>F</xsd:includeGroupDetail>"
        ),
    )
}

impl GrouperProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let client = build_http_client(&config)?;
        let group_id_prefix = urn::group_urn_prefix(&config.schac_home_organization);
        Ok(Self {
            config,
            client,
            group_id_prefix,
        })
    }

    async fn call(&self, operation: &str, envelope: String) -> Result<SoapResults, ProviderError> {
        tracing::debug!(provider = %self.config.name, operation, "Calling group registry");

        let response = self
            .client
            .traced_post(&self.config.url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("SOAPAction", operation)
            .body(envelope)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.config.timeout))?;

        // SOAP faults come back as 500 with a readable body.
        if !status.is_success() && !body.contains("Fault") {
            return Err(ProviderError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        parse_soap_results(&body)?.into_checked()
    }

    fn to_group(&self, ws: &WsGroup, role: MembershipRole) -> Group {
        let display_name = ws
            .display_extension
            .clone()
            .or_else(|| ws.display_name.clone())
            .unwrap_or_else(|| ws.name.clone());
        Group::new(
            format!("{}{}", self.group_id_prefix, ws.name),
            display_name,
            ws.description.clone(),
            self.config.schac_home_organization.clone(),
            role,
        )
    }

    fn groups_with_roles(&self, results: &SoapResults) -> Vec<Group> {
        let roles = results.roles();
        let mut seen = std::collections::HashSet::new();
        results
            .groups
            .iter()
            .filter(|g| !g.name.is_empty() && seen.insert(g.name.as_str()))
            .map(|g| {
                let role = roles.get(g.name.as_str()).copied().unwrap_or_default();
                self.to_group(g, role)
            })
            .collect()
    }
}

#[async_trait]
impl Provider for GrouperProvider {
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
        false
    }

    fn supports_getting_members_of_group(&self) -> bool {
        self.config.supports_get_members
    }

    fn should_be_queried_for_memberships(&self, _schac_home_organization: &str) -> bool {
        true
    }

    fn should_be_queried_for_group(&self, group_id: &str) -> bool {
        authoritative_should_be_queried_for_group(&self.config.schac_home_organization, group_id)
    }

    async fn get_group_memberships(&self, uid: &str) -> Result<Vec<Group>, ProviderError> {
        let results = self
            .call("getMemberships", get_memberships_request(Some(uid), None))
            .await?;
        Ok(self.groups_with_roles(&results))
    }

    async fn get_group_membership(
        &self,
        uid: &str,
        group_id: &str,
    ) -> Result<Option<Group>, ProviderError> {
        let local_name = urn::strip_group_urn_identifier(group_id);
        let results = self
            .call(
                "getMemberships",
                get_memberships_request(Some(uid), Some(local_name)),
            )
            .await?;
        Ok(self
            .groups_with_roles(&results)
            .into_iter()
            .find(|g| urn::strip_group_urn_identifier(&g.id) == local_name))
    }

    async fn get_members_of_group(&self, group_id: &str) -> Result<Vec<Member>, ProviderError> {
        let local_name = urn::strip_group_urn_identifier(group_id);
        let results = self
            .call("getMemberships", get_memberships_request(None, Some(local_name)))
            .await?;

        let mut seen = std::collections::HashSet::new();
        Ok(results
            .subjects
            .into_iter()
            .filter(|s| !s.id.is_empty() && seen.insert(s.id.clone()))
            .map(|s| {
                let display_name = s.name.unwrap_or_else(|| s.id.clone());
                Member::new(s.id, display_name)
            })
            .collect())
    }

    async fn get_all_groups(&self) -> Result<Vec<Group>, ProviderError> {
        let results = self.call("findGroups", find_all_groups_request()).await?;
        Ok(self.groups_with_roles(&results))
    }
}

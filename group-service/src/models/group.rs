use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a person within a group, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    #[default]
    Member,
    Manager,
    Admin,
}

impl MembershipRole {
    /// Lenient mapping of backend role strings; unknown values are plain members.
    pub fn from_backend(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" | "admins" | "owner" => MembershipRole::Admin,
            "manager" | "updaters" => MembershipRole::Manager,
            _ => MembershipRole::Member,
        }
    }
}

impl fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MembershipRole::Member => f.write_str("member"),
            MembershipRole::Manager => f.write_str("manager"),
            MembershipRole::Admin => f.write_str("admin"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Membership {
    pub basic: MembershipRole,
}

impl From<MembershipRole> for Membership {
    fn from(basic: MembershipRole) -> Self {
        Self { basic }
    }
}

/// A group as seen by one person. `id` is the fully qualified group URN and
/// the deduplication key across providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schac_home_organization: String,
    pub membership: Membership,
}

impl Group {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: Option<String>,
        schac_home_organization: impl Into<String>,
        role: MembershipRole,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            description,
            schac_home_organization: schac_home_organization.into(),
            membership: role.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub display_name: String,
}

impl Member {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

//! `urn:collab:group:<org>:<id>` / `urn:collab:person:<org>:<id>` helpers.
//!
//! Stripping functions are lenient (non-matching input comes back unchanged);
//! routing and request validation use the `is_*` / `schac_home_*` checks.

use regex::Regex;
use service_core::error::AppError;
use std::sync::LazyLock;
use thiserror::Error;

pub const URN_COLLAB_GROUP_REGEXP: &str = r"^urn:collab:group:([^:]+):(.+)$";
pub const URN_COLLAB_PERSON_REGEXP: &str = r"^urn:collab:person:([^:]+):(.+)$";

static GROUP_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(URN_COLLAB_GROUP_REGEXP).expect("group URN pattern is valid"));
static PERSON_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(URN_COLLAB_PERSON_REGEXP).expect("person URN pattern is valid"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrnError {
    #[error("{0} is not a valid group-urn. Values must adhere to regexp: {}", URN_COLLAB_GROUP_REGEXP)]
    MalformedGroupUrn(String),

    #[error("{0} is not a valid person-urn. Values must adhere to regexp: {}", URN_COLLAB_PERSON_REGEXP)]
    MalformedPersonUrn(String),
}

impl From<UrnError> for AppError {
    fn from(err: UrnError) -> Self {
        AppError::BadRequest(anyhow::Error::new(err))
    }
}

/// Local part of a group URN, or the input when it is not a group URN.
pub fn strip_group_urn_identifier(group_id: &str) -> &str {
    GROUP_PATTERN
        .captures(group_id)
        .and_then(|c| c.get(2))
        .map_or(group_id, |m| m.as_str())
}

/// Local part of a person URN, or the input when it is not a person URN.
pub fn strip_person_urn_identifier(uid: &str) -> &str {
    PERSON_PATTERN
        .captures(uid)
        .and_then(|c| c.get(2))
        .map_or(uid, |m| m.as_str())
}

pub fn is_fully_qualified_group_name(group_id: &str) -> bool {
    GROUP_PATTERN.is_match(group_id)
}

pub fn is_fully_qualified_person_name(uid: &str) -> bool {
    PERSON_PATTERN.is_match(uid)
}

/// True for strings that claim to be a URN but do not parse as a group URN.
/// Plain institution-local names (no `urn:` prefix) are not malformed.
pub fn is_malformed_group_urn(group_id: &str) -> bool {
    group_id.starts_with("urn:") && !is_fully_qualified_group_name(group_id)
}

pub fn schac_home_from_group_urn(group_id: &str) -> Option<&str> {
    GROUP_PATTERN
        .captures(group_id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn schac_home_from_person_urn(uid: &str) -> Option<&str> {
    PERSON_PATTERN
        .captures(uid)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Validates a group URN for request handling.
pub fn require_group_urn(group_id: &str) -> Result<&str, UrnError> {
    if is_fully_qualified_group_name(group_id) {
        Ok(group_id)
    } else {
        Err(UrnError::MalformedGroupUrn(group_id.to_string()))
    }
}

/// Validates a person URN and returns its organization.
pub fn require_person_urn(uid: &str) -> Result<&str, UrnError> {
    schac_home_from_person_urn(uid).ok_or_else(|| UrnError::MalformedPersonUrn(uid.to_string()))
}

/// `urn:collab:group:<org>:` for the given organization.
pub fn group_urn_prefix(schac_home_organization: &str) -> String {
    format!("urn:collab:group:{}:", schac_home_organization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_group_urn_identifier() {
        assert_eq!(
            strip_group_urn_identifier("urn:collab:group:surfteams.nl:nl:surfnet:diensten:apachecon"),
            "nl:surfnet:diensten:apachecon"
        );
        assert_eq!(strip_group_urn_identifier("apachecon"), "apachecon");
        assert_eq!(strip_group_urn_identifier("urn:collab:group:"), "urn:collab:group:");
    }

    #[test]
    fn test_strip_person_urn_identifier() {
        assert_eq!(
            strip_person_urn_identifier("urn:collab:person:example.org:admin"),
            "admin"
        );
        assert_eq!(strip_person_urn_identifier("admin"), "admin");
    }

    #[test]
    fn test_schac_home_extraction() {
        assert_eq!(
            schac_home_from_group_urn("urn:collab:group:example.org:course:math"),
            Some("example.org")
        );
        assert_eq!(schac_home_from_group_urn("not-a-urn"), None);
        assert_eq!(
            schac_home_from_person_urn("urn:collab:person:example.org:jdoe"),
            Some("example.org")
        );
        assert_eq!(schac_home_from_person_urn("urn:collab:person:jdoe"), None);
    }

    #[test]
    fn test_malformed_group_urn() {
        assert!(is_malformed_group_urn("urn:collab:group:example.org"));
        assert!(is_malformed_group_urn("urn:collab:person:example.org:jdoe"));
        assert!(!is_malformed_group_urn("urn:collab:group:example.org:x"));
        assert!(!is_malformed_group_urn("nl:surfnet:diensten:apachecon"));
    }

    #[test]
    fn test_require_urn_errors_name_the_input() {
        let err = require_group_urn("bogus").unwrap_err();
        assert_eq!(err, UrnError::MalformedGroupUrn("bogus".to_string()));
        assert!(err.to_string().starts_with("bogus is not a valid group-urn"));

        assert_eq!(
            require_person_urn("urn:collab:person:example.org:jdoe"),
            Ok("example.org")
        );
        assert!(matches!(
            require_person_urn("jdoe"),
            Err(UrnError::MalformedPersonUrn(_))
        ));
    }
}

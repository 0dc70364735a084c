use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of validating one bearer token.
///
/// A verdict without a `principal` belongs to a client-credentials token
/// (a machine client acting on its own behalf).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Name of the validator that produced a positive verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl ValidationVerdict {
    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    pub fn is_client_credentials(&self) -> bool {
        self.principal.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_verdict_has_nothing() {
        let verdict = ValidationVerdict::invalid();
        assert!(!verdict.valid);
        assert!(verdict.scopes.is_empty());
        assert!(verdict.is_client_credentials());
    }

    #[test]
    fn test_has_scope_is_exact() {
        let verdict = ValidationVerdict {
            valid: true,
            scopes: vec!["read".to_string(), "groups".to_string()],
            ..Default::default()
        };
        assert!(verdict.has_scope("read"));
        assert!(!verdict.has_scope("rea"));
    }
}

//! Group and membership endpoints.
//!
//! `/me/*` answers for the user behind the token. `/internal/*` and
//! `/members/*` are reserved for client-credentials callers and name the
//! user explicitly.

use axum::{
    Json,
    extract::{Path, State},
};
use service_core::error::AppError;

use crate::{
    AppState,
    middleware::AuthenticatedClient,
    models::{Group, Member, ValidationVerdict},
    utils::urn,
};

/// Principal and home organization of a user token.
fn user_of(verdict: &ValidationVerdict) -> Result<(&str, &str), AppError> {
    let principal = verdict.principal.as_deref().ok_or_else(|| {
        AppError::Forbidden(anyhow::anyhow!(
            "Client credentials tokens carry no user; use the internal endpoints"
        ))
    })?;
    let organization = verdict
        .organization
        .as_deref()
        .or_else(|| urn::schac_home_from_person_urn(principal))
        .unwrap_or_default();
    Ok((principal, organization))
}

pub async fn my_groups(
    State(state): State<AppState>,
    AuthenticatedClient(verdict): AuthenticatedClient,
) -> Result<Json<Vec<Group>>, AppError> {
    let (uid, organization) = user_of(&verdict)?;
    Ok(Json(state.engine.get_my_groups(uid, organization).await))
}

pub async fn my_group_by_id(
    State(state): State<AppState>,
    AuthenticatedClient(verdict): AuthenticatedClient,
    Path(group_id): Path<String>,
) -> Result<Json<Group>, AppError> {
    let (uid, _) = user_of(&verdict)?;
    urn::require_group_urn(&group_id)?;

    state
        .engine
        .get_my_group_by_id(uid, &group_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Group {} not found", group_id)))
}

pub async fn user_groups(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Group>>, AppError> {
    let organization = urn::require_person_urn(&user_id)?;
    Ok(Json(state.engine.get_my_groups(&user_id, organization).await))
}

pub async fn user_group_by_id(
    State(state): State<AppState>,
    Path((user_id, group_id)): Path<(String, String)>,
) -> Result<Json<Group>, AppError> {
    urn::require_person_urn(&user_id)?;
    urn::require_group_urn(&group_id)?;

    state
        .engine
        .get_my_group_by_id(&user_id, &group_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Group {} not found", group_id)))
}

pub async fn user_external_groups(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Group>>, AppError> {
    let organization = urn::require_person_urn(&user_id)?;
    Ok(Json(
        state
            .engine
            .get_my_external_groups(&user_id, organization)
            .await,
    ))
}

pub async fn all_groups(State(state): State<AppState>) -> Json<Vec<Group>> {
    Json(state.engine.get_all_groups().await)
}

pub async fn members(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Member>>, AppError> {
    urn::require_group_urn(&group_id)?;
    Ok(Json(state.engine.get_members_of_group(&group_id).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_of_falls_back_to_urn_organization() {
        let verdict = ValidationVerdict {
            valid: true,
            principal: Some("urn:collab:person:example.org:admin".to_string()),
            ..Default::default()
        };
        assert_eq!(
            user_of(&verdict).unwrap(),
            ("urn:collab:person:example.org:admin", "example.org")
        );
    }

    #[test]
    fn test_user_of_rejects_client_credentials() {
        let verdict = ValidationVerdict {
            valid: true,
            client_id: Some("portal".to_string()),
            ..Default::default()
        };
        assert!(matches!(user_of(&verdict), Err(AppError::Forbidden(_))));
    }
}

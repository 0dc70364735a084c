use crate::AppState;
use crate::models::ValidationVerdict;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

fn bearer_token(req: &Request) -> Option<&str> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Validates the bearer token through the validation chain and stores the
/// verdict in the request extensions.
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).map(str::to_string).ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let verdict = state.token_chain.validate(&token).await;
    if !verdict.valid {
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid or expired token"
        )));
    }

    if !verdict.has_scope(&state.required_scope) {
        tracing::warn!(
            client_id = ?verdict.client_id,
            required_scope = %state.required_scope,
            granted_scopes = ?verdict.scopes,
            "Insufficient scopes"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Insufficient scopes. Required: {}",
            state.required_scope
        )));
    }

    req.extensions_mut().insert(verdict);
    Ok(next.run(req).await)
}

/// Only machine clients acting on their own behalf may pass.
pub async fn require_client_credentials(req: Request, next: Next) -> Result<Response, AppError> {
    let verdict = req.extensions().get::<ValidationVerdict>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Token verdict missing from request extensions"
        ))
    })?;

    if !verdict.is_client_credentials() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Endpoint requires a client credentials token"
        )));
    }

    Ok(next.run(req).await)
}

/// Extractor for the verdict of the authenticated caller.
pub struct AuthenticatedClient(pub ValidationVerdict);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedClient
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let verdict = parts.extensions.get::<ValidationVerdict>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Token verdict missing from request extensions"
            ))
        })?;

        Ok(AuthenticatedClient(verdict.clone()))
    }
}

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use crate::{
    auth::jwt::JwtKeys,
    error::AppError,
    state::AppState,
    users::repo_types::{Role, UserAccount},
};

/// Bearer credential from the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok())?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<UserAccount, AppError> {
    let token = bearer_token(&parts.headers)
        .ok_or(AppError::Unauthenticated("Authentication required"))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify_access(token).map_err(|e| {
        warn!(error = %e, "rejected access token");
        AppError::from(e)
    })?;

    state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::Unauthenticated("Account no longer exists"))
}

/// Authenticated caller, resolved from the access token.
pub struct AuthUser(pub UserAccount);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state).await.map(AuthUser)
    }
}

/// Caller identity when one is presented; anonymous otherwise. Never rejects.
pub struct MaybeAuthUser(pub Option<UserAccount>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if bearer_token(&parts.headers).is_none() {
            return Ok(MaybeAuthUser(None));
        }
        Ok(MaybeAuthUser(resolve(parts, state).await.ok()))
    }
}

pub fn require_role(user: &UserAccount, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.is_empty() || user.has_role(allowed) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = %user.role, "role not permitted");
        Err(AppError::Forbidden)
    }
}

/// Authenticated caller holding the admin role.
pub struct AdminUser(pub UserAccount);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        require_role(&user, &[Role::Admin])?;
        Ok(AdminUser(user))
    }
}

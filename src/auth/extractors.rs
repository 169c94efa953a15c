use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::jwt::{JwtKeys, TokenError};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::model::{User, UserRole};

/// Access gate for protected routes: extracts the bearer token, verifies it,
/// loads the current user and rejects tokens issued before the last password
/// change. Handlers receive the already-loaded user.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(no_token)?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(no_token)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| match e {
            TokenError::Expired => {
                ApiError::Authentication("Your token has expired. Please log in again".into())
            }
            TokenError::Invalid => {
                ApiError::Authentication("Invalid token. Please log in again!".into())
            }
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .ok_or_else(|| ApiError::Authentication("No user found with that token!".into()))?;

        if user.password_changed_after(claims.iat as i64) {
            warn!(user_id = %user.id, "token issued before last password change");
            return Err(ApiError::Authentication(
                "User recently changed password! Please log in again".into(),
            ));
        }

        Ok(CurrentUser(user))
    }
}

fn no_token() -> ApiError {
    ApiError::Authentication("You are not logged in! Please log in to get access.".into())
}

/// Role gate for admin-only routes, layered on top of [`CurrentUser`].
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.role.is_allowed(&[UserRole::Admin]) {
            return Err(ApiError::Forbidden(
                "You do not have permission to perform this action".into(),
            ));
        }
        Ok(AdminUser(user))
    }
}

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{patch, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::auth::dto::{
    AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest,
    SignupRequest,
};
use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::reset::{self, ResetToken};
use crate::email::reset_password_body;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::model::{NewUser, User, UserRole};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password/:token", patch(reset_password))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn validate_new_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "A user password must have more or equal to 8 characters.".into(),
        ));
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords are not the same".into()));
    }
    Ok(())
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.first_name = payload.first_name.trim().to_string();
    payload.last_name = payload.last_name.trim().to_string();
    payload.email = payload.email.trim().to_string();

    if payload.first_name.is_empty() {
        return Err(ApiError::Validation("A user must have a first-name".into()));
    }
    if payload.last_name.is_empty() {
        return Err(ApiError::Validation("A user must have a last-name".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("A user must have a valid email".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    // Ensure email is not taken; the unique index still backstops races.
    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &NewUser {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            photo: payload.photo,
            password_hash,
            role: UserRole::User,
        },
    )
    .await?;

    let token = JwtKeys::from_ref(&state).sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation(
            "Please provide email and password!".into(),
        ));
    }

    let user = match User::find_by_email(&state.db, payload.email.trim()).await? {
        Some(u) => u,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(bad_credentials());
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(bad_credentials());
    }

    if !user.active {
        warn!(user_id = %user.id, "login on disabled account");
        return Err(ApiError::Authentication("This user is disabled".into()));
    }

    if user.is_expired(OffsetDateTime::now_utc()) {
        warn!(user_id = %user.id, "login on expired account");
        return Err(ApiError::Authentication(
            "The user's account has expired. Please contact the admin.".into(),
        ));
    }

    let token = JwtKeys::from_ref(&state).sign(user.id)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

fn bad_credentials() -> ApiError {
    // Unknown email and wrong password are deliberately indistinguishable.
    ApiError::Authentication("Incorrect email or password!".into())
}

/// Sessions are stateless, so logout is a plain acknowledgement; the token
/// simply ages out.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Logout successfully!".into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = User::find_by_email(&state.db, payload.email.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("There is no user with this email".into()))?;

    let token = ResetToken::generate();
    User::set_reset_token(&state.db, user.id, &token.token_hash, token.expires_at).await?;

    let body = reset_password_body(&state.config.smtp.reset_url_base, &token.raw);
    if let Err(e) = state
        .mailer
        .send(
            &user.email,
            "Your password reset token (valid for 10 min)",
            body,
        )
        .await
    {
        // A token nobody received must not stay live.
        error!(error = %e, user_id = %user.id, "reset email failed, rolling back token");
        User::clear_reset_token(&state.db, user.id).await?;
        return Err(ApiError::Delivery(
            "There was an error sending the email. Try again later!".into(),
        ));
    }

    info!(user_id = %user.id, "reset token sent");
    Ok(Json(MessageResponse {
        message: "Token sent to email!".into(),
    }))
}

// skip_all keeps the raw secret out of the request span.
#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    // Validation failures must leave any stored reset token untouched.
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let token_hash = reset::hash_token(&token);
    let password_hash = hash_password(&payload.password)?;

    let user = User::reset_password(&state.db, &token_hash, &password_hash)
        .await?
        .ok_or_else(|| ApiError::Validation("Token is invalid or has expired".into()))?;

    let session = JwtKeys::from_ref(&state).sign(user.id)?;

    info!(user_id = %user.id, "password reset completed");
    Ok(Json(AuthResponse {
        token: session,
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("user1@user1.io"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("a lice@example.com"));
    }

    #[test]
    fn short_password_rejected() {
        let err = validate_new_password("short", "short").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn mismatched_confirmation_rejected() {
        let err = validate_new_password("NewPass1", "Different").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn matching_password_accepted() {
        assert!(validate_new_password("NewPass1", "NewPass1").is_ok());
    }
}

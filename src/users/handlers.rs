use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use rand::Rng;
use time::{Duration, OffsetDateTime};
use tracing::{info, instrument, warn};

use crate::auth::extractors::{AdminUser, CurrentUser};
use crate::auth::handlers::{is_valid_email, validate_new_password};
use crate::auth::password::hash_password;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::{
    AdminUpdateRequest, CreateUserRequest, SeedUsersRequest, SeedUsersResponse, UpdateMeRequest,
    UserListResponse, YearQuery,
};
use crate::users::model::{AdminUpdate, NewUser, ProfileUpdate, User, UserRole};

pub fn me_routes() -> Router<AppState> {
    Router::new().route(
        "/users/me",
        get(get_me).patch(update_me).delete(delete_me),
    )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/seed", post(seed_users))
        .route(
            "/users/registered/:start_month/:end_month",
            get(users_registered_between),
        )
        .route(
            "/users/:email",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/users/:email/renew", patch(renew_user))
        .route("/users/:email/activate", patch(activate_user))
}

// --- current user ---

pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}

#[instrument(skip(state, user, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<UpdateMeRequest>,
) -> Result<Json<User>, ApiError> {
    if let Some(email) = &payload.email {
        if !is_valid_email(email.trim()) {
            return Err(ApiError::Validation("A user must have a valid email".into()));
        }
    }

    let update = ProfileUpdate {
        first_name: payload.first_name,
        last_name: payload.last_name,
        email: payload.email.map(|e| e.trim().to_string()),
        photo: payload.photo,
    };
    let updated = User::update_profile(&state.db, user.id, &update)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("No user found with that token!".into()))?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated))
}

#[instrument(skip(state, user))]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, ApiError> {
    User::deactivate_by_id(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deactivated by owner");
    Ok(StatusCode::NO_CONTENT)
}

// --- admin interface ---

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<UserListResponse>, ApiError> {
    let users = User::list_all(&state.db).await?;
    Ok(Json(UserListResponse {
        results: users.len(),
        users,
    }))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(email): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(ApiError::Validation(
            "A user must have a first-name and a last-name".into(),
        ));
    }
    if !is_valid_email(payload.email.trim()) {
        return Err(ApiError::Validation("A user must have a valid email".into()));
    }
    validate_new_password(&payload.password, &payload.password_confirm)?;

    let password_hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &NewUser {
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            email: payload.email.trim().to_string(),
            photo: payload.photo,
            password_hash,
            role: payload.role.unwrap_or(UserRole::User),
        },
    )
    .await?;

    info!(user_id = %user.id, email = %user.email, "user created by admin");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, _admin, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(email): Path<String>,
    Json(payload): Json<AdminUpdateRequest>,
) -> Result<Json<User>, ApiError> {
    if let Some(new_email) = &payload.email {
        if !is_valid_email(new_email.trim()) {
            return Err(ApiError::Validation("A user must have a valid email".into()));
        }
    }

    let update = AdminUpdate {
        first_name: payload.first_name,
        last_name: payload.last_name,
        email: payload.email.map(|e| e.trim().to_string()),
        photo: payload.photo,
        role: payload.role,
        active: payload.active,
    };
    let user = User::update_by_email(&state.db, &email, &update)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(user_not_found)?;

    info!(user_id = %user.id, "user updated by admin");
    Ok(Json(user))
}

#[instrument(skip(state, _admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !User::delete_by_email(&state.db, &email).await? {
        return Err(user_not_found());
    }
    info!(%email, "user deleted by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// Extends an expired account by 30 days. The expiry condition is part of
/// the UPDATE, so a still-valid account comes back unchanged as a validation
/// error rather than being silently extended.
#[instrument(skip(state, _admin))]
pub async fn renew_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(email): Path<String>,
) -> Result<Json<User>, ApiError> {
    // Distinguish "no such user" from "not expired yet".
    let existing = User::find_by_email(&state.db, &email)
        .await?
        .ok_or_else(user_not_found)?;

    let renewed = User::renew_expired(&state.db, &email)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %existing.id, "renew refused, account still valid");
            ApiError::Validation("The user is active and valid.".into())
        })?;

    info!(user_id = %renewed.id, "account renewed");
    Ok(Json(renewed))
}

#[instrument(skip(state, _admin))]
pub async fn activate_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(email): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = User::set_active(&state.db, &email, true)
        .await?
        .ok_or_else(user_not_found)?;
    info!(user_id = %user.id, "account activated");
    Ok(Json(user))
}

/// Bulk test-user creation. The sequence index derives from the store's
/// current row count instead of process-wide state, so restarts and multiple
/// instances stay consistent.
#[instrument(skip(state, _admin, payload))]
pub async fn seed_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<SeedUsersRequest>,
) -> Result<Json<SeedUsersResponse>, ApiError> {
    if payload.count == 0 || payload.count > 100 {
        return Err(ApiError::Validation(
            "count must be between 1 and 100".into(),
        ));
    }

    let base = User::count(&state.db).await? + 1;
    // All seed users share one password, hash it once.
    let password_hash = hash_password("user1234")?;

    // Draw registration offsets up front; the RNG must not live across awaits.
    let day_offsets: Vec<i64> = {
        let mut rng = rand::thread_rng();
        (0..payload.count).map(|_| rng.gen_range(0..365)).collect()
    };

    let now = OffsetDateTime::now_utc();
    for (i, days_ago) in day_offsets.into_iter().enumerate() {
        let index = base + i as i64;
        let new = NewUser {
            first_name: format!("User{index}"),
            last_name: format!("User{index}"),
            email: format!("user{index}@user{index}.io"),
            photo: None,
            password_hash: password_hash.clone(),
            role: UserRole::User,
        };
        User::create_registered_at(&state.db, &new, now - Duration::days(days_ago)).await?;
    }

    info!(count = payload.count, "seed users created");
    Ok(Json(SeedUsersResponse {
        created: payload.count,
    }))
}

#[instrument(skip(state, _admin))]
pub async fn users_registered_between(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path((start_month, end_month)): Path<(u8, u8)>,
    Query(query): Query<YearQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    if start_month < 1 || end_month > 12 || start_month > end_month {
        return Err(ApiError::Validation("The parameters are not valid!".into()));
    }

    let year = query
        .year
        .unwrap_or_else(|| OffsetDateTime::now_utc().year());
    let users = User::registered_in_months(&state.db, year, start_month, end_month).await?;
    Ok(Json(UserListResponse {
        results: users.len(),
        users,
    }))
}

fn user_not_found() -> ApiError {
    ApiError::NotFound("No user found with that email!".into())
}

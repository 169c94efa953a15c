use serde::{Deserialize, Serialize};

use crate::users::model::{User, UserRole};

/// Fields the account owner may change about themselves. Anything else in
/// the body is ignored rather than rejected.
#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}

/// Admin-side user creation; unlike signup, the role is assignable.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub photo: Option<String>,
    pub password: String,
    pub password_confirm: String,
    pub role: Option<UserRole>,
}

/// Admin-side partial update. Passwords are only changed through the reset
/// flow so the hash never bypasses the hashing step.
#[derive(Debug, Deserialize)]
pub struct AdminUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub results: usize,
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct SeedUsersRequest {
    pub count: u32,
}

#[derive(Debug, Serialize)]
pub struct SeedUsersResponse {
    pub created: u32,
}

#[derive(Debug, Deserialize)]
pub struct YearQuery {
    pub year: Option<i32>,
}

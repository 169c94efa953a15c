use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl UserRole {
    pub fn is_allowed(self, allowed: &[UserRole]) -> bool {
        allowed.contains(&self)
    }
}

/// User record in the database. Secret-bearing columns are never serialized.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub photo: String,
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_token_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<OffsetDateTime>,
    pub active: bool,
    pub registered_date: OffsetDateTime,
    pub expiry_date: OffsetDateTime,
}

/// Fields required to insert a new user.
#[derive(Debug)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub photo: Option<String>,
    pub password_hash: String,
    pub role: UserRole,
}

/// Partial update applied by the owner of the account.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
}

/// Partial update applied by an admin; never touches the password.
#[derive(Debug, Default)]
pub struct AdminUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub photo: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

const USER_COLUMNS: &str = "id, first_name, last_name, email, photo, role, password_hash, \
     password_changed_at, password_reset_token_hash, password_reset_expires, \
     active, registered_date, expiry_date";

impl User {
    /// True if the given token issue time (unix seconds) predates the last
    /// password change, meaning the token must be rejected as stale.
    pub fn password_changed_after(&self, token_issued_at: i64) -> bool {
        match self.password_changed_at {
            Some(changed) => token_issued_at < changed.unix_timestamp(),
            None => false,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expiry_date
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Insert a new user. The account validity window and the stale-token
    /// watermark are derived in the same statement: expiry is one month after
    /// registration, and `password_changed_at` sits one second in the past so
    /// a token issued immediately after signup is not rejected as stale.
    pub async fn create(db: &PgPool, new: &NewUser) -> Result<User, sqlx::Error> {
        let sql = format!(
            "INSERT INTO users \
                 (first_name, last_name, email, photo, role, password_hash, \
                  password_changed_at, registered_date, expiry_date) \
             VALUES ($1, $2, $3, COALESCE($4, 'default.jpg'), $5, $6, \
                     now() - interval '1 second', now(), now() + interval '1 month') \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .bind(&new.photo)
            .bind(new.role)
            .bind(&new.password_hash)
            .fetch_one(db)
            .await
    }

    /// Insert a test user with an explicit registration date (bulk seeding).
    pub async fn create_registered_at(
        db: &PgPool,
        new: &NewUser,
        registered_date: OffsetDateTime,
    ) -> Result<User, sqlx::Error> {
        let sql = format!(
            "INSERT INTO users \
                 (first_name, last_name, email, photo, role, password_hash, \
                  password_changed_at, registered_date, expiry_date) \
             VALUES ($1, $2, $3, COALESCE($4, 'default.jpg'), $5, $6, \
                     now() - interval '1 second', $7, $7 + interval '1 month') \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&new.first_name)
            .bind(&new.last_name)
            .bind(&new.email)
            .bind(&new.photo)
            .bind(new.role)
            .bind(&new.password_hash)
            .bind(registered_date)
            .fetch_one(db)
            .await
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY registered_date DESC");
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(db).await?;
        Ok(users)
    }

    pub async fn count(db: &PgPool) -> anyhow::Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(db)
            .await?;
        Ok(count)
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET \
                 first_name = COALESCE($2, first_name), \
                 last_name = COALESCE($3, last_name), \
                 email = COALESCE($4, email), \
                 photo = COALESCE($5, photo) \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.email)
            .bind(&update.photo)
            .fetch_optional(db)
            .await
    }

    pub async fn update_by_email(
        db: &PgPool,
        email: &str,
        update: &AdminUpdate,
    ) -> Result<Option<User>, sqlx::Error> {
        let sql = format!(
            "UPDATE users SET \
                 first_name = COALESCE($2, first_name), \
                 last_name = COALESCE($3, last_name), \
                 email = COALESCE($4, email), \
                 photo = COALESCE($5, photo), \
                 role = COALESCE($6, role), \
                 active = COALESCE($7, active) \
             WHERE email = $1 \
             RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(&update.first_name)
            .bind(&update.last_name)
            .bind(&update.email)
            .bind(&update.photo)
            .bind(update.role)
            .bind(update.active)
            .fetch_optional(db)
            .await
    }

    pub async fn delete_by_email(db: &PgPool, email: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE email = $1")
            .bind(email)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store the hash and expiry of a freshly generated reset secret.
    pub async fn set_reset_token(
        db: &PgPool,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token_hash = $2, password_reset_expires = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Roll back a pending reset secret (email delivery failed).
    pub async fn clear_reset_token(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE users SET password_reset_token_hash = NULL, password_reset_expires = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Consume a reset secret and install the new password hash in one
    /// conditional statement. Matching on the stored hash and an unexpired
    /// window while clearing both fields in the same UPDATE makes the token
    /// single-use even under concurrent requests; wrong and expired secrets
    /// both come back as `None`.
    pub async fn reset_password(
        db: &PgPool,
        token_hash: &str,
        new_password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET \
                 password_hash = $2, \
                 password_changed_at = now() - interval '1 second', \
                 password_reset_token_hash = NULL, \
                 password_reset_expires = NULL \
             WHERE password_reset_token_hash = $1 \
               AND password_reset_expires > now() \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(token_hash)
            .bind(new_password_hash)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    /// Extend the validity window of an already expired account by 30 days.
    /// The expiry condition lives in the UPDATE itself so a still-valid
    /// account is never extended.
    pub async fn renew_expired(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET expiry_date = now() + interval '30 days' \
             WHERE email = $1 AND expiry_date <= now() \
             RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn set_active(
        db: &PgPool,
        email: &str,
        active: bool,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!(
            "UPDATE users SET active = $2 WHERE email = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .bind(active)
            .fetch_optional(db)
            .await?;
        Ok(user)
    }

    pub async fn deactivate_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Users whose registration falls inside a month window of one year.
    pub async fn registered_in_months(
        db: &PgPool,
        year: i32,
        start_month: u8,
        end_month: u8,
    ) -> anyhow::Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE registered_date >= make_date($1, $2, 1) \
               AND registered_date < make_date($1, $3, 1) + interval '1 month' \
             ORDER BY registered_date"
        );
        let users = sqlx::query_as::<_, User>(&sql)
            .bind(year)
            .bind(start_month as i32)
            .bind(end_month as i32)
            .fetch_all(db)
            .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn sample_user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            first_name: "Alice".into(),
            last_name: "Smith".into(),
            email: "alice@example.com".into(),
            photo: "default.jpg".into(),
            role: UserRole::User,
            password_hash: "$argon2id$v=19$secret".into(),
            password_changed_at: Some(now - Duration::hours(1)),
            password_reset_token_hash: Some("deadbeef".into()),
            password_reset_expires: Some(now + Duration::minutes(10)),
            active: true,
            registered_date: now - Duration::days(10),
            expiry_date: now + Duration::days(20),
        }
    }

    #[test]
    fn token_issued_before_password_change_is_stale() {
        let user = sample_user();
        let changed = user.password_changed_at.unwrap().unix_timestamp();
        assert!(user.password_changed_after(changed - 60));
        assert!(!user.password_changed_after(changed + 60));
    }

    #[test]
    fn user_without_password_change_is_never_stale() {
        let mut user = sample_user();
        user.password_changed_at = None;
        assert!(!user.password_changed_after(0));
    }

    #[test]
    fn expiry_window_check() {
        let user = sample_user();
        assert!(!user.is_expired(OffsetDateTime::now_utc()));
        assert!(user.is_expired(user.expiry_date + Duration::seconds(1)));
    }

    #[test]
    fn role_membership() {
        assert!(UserRole::Admin.is_allowed(&[UserRole::Admin]));
        assert!(!UserRole::User.is_allowed(&[UserRole::Admin]));
        assert!(UserRole::User.is_allowed(&[UserRole::User, UserRole::Admin]));
    }

    #[test]
    fn secrets_never_serialized() {
        let user = sample_user();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
        assert!(!json.contains("password_reset_token_hash"));
        assert!(!json.contains("deadbeef"));
        assert!(json.contains("alice@example.com"));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&UserRole::User).unwrap(), "\"user\"");
    }
}

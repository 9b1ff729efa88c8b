use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CreateUserParams, RepoError, UpdateProfileParams, UsersRepo};
use crate::domain::entities::{UserProfileRecord, UserRecord};
use crate::domain::types::UserRole;

use super::{PostgresRepositories, map_sqlx_error};

const USER_COLUMNS: &str = "id, email, username, full_name, hashed_password, bio, avatar_url, \
     is_active, is_verified, is_superuser, role, token_version, last_login, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    full_name: Option<String>,
    hashed_password: String,
    bio: Option<String>,
    avatar_url: Option<String>,
    is_active: bool,
    is_verified: bool,
    is_superuser: bool,
    role: UserRole,
    token_version: i32,
    last_login: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            full_name: row.full_name,
            hashed_password: row.hashed_password,
            bio: row.bio,
            avatar_url: row.avatar_url,
            is_active: row.is_active,
            is_verified: row.is_verified,
            is_superuser: row.is_superuser,
            role: row.role,
            token_version: row.token_version,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: i64,
    website: Option<String>,
    location: Option<String>,
    company: Option<String>,
}

impl From<ProfileRow> for UserProfileRecord {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            website: row.website,
            location: row.location,
            company: row.company,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO users (email, username, full_name, hashed_password, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&params.email)
            .bind(&params.username)
            .bind(&params.full_name)
            .bind(&params.hashed_password)
            .bind(params.role)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("INSERT INTO user_profiles (user_id) VALUES ($1)")
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE lower(username) = lower($1)");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn find_profile(&self, user_id: i64) -> Result<Option<UserProfileRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT user_id, website, location, company FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserProfileRecord::from))
    }

    async fn record_login(&self, id: i64, at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_password(
        &self,
        id: i64,
        hashed_password: &str,
    ) -> Result<UserRecord, RepoError> {
        let sql = format!(
            "UPDATE users SET hashed_password = $2, token_version = token_version + 1, \
             updated_at = now() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(hashed_password)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update_profile(
        &self,
        params: UpdateProfileParams,
    ) -> Result<(UserRecord, UserProfileRecord), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // NULL keeps the stored value; an empty string clears it.
        let sql = format!(
            "UPDATE users SET \
                 full_name = CASE WHEN $2::text IS NULL THEN full_name ELSE NULLIF($2, '') END, \
                 bio = CASE WHEN $3::text IS NULL THEN bio ELSE NULLIF($3, '') END, \
                 avatar_url = CASE WHEN $4::text IS NULL THEN avatar_url ELSE NULLIF($4, '') END, \
                 updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, UserRow>(&sql)
            .bind(params.user_id)
            .bind(&params.full_name)
            .bind(&params.bio)
            .bind(&params.avatar_url)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let profile = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO user_profiles (user_id, website, location, company) \
             VALUES ($1, NULLIF($2, ''), NULLIF($3, ''), NULLIF($4, '')) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 website = CASE WHEN $2::text IS NULL THEN user_profiles.website ELSE EXCLUDED.website END, \
                 location = CASE WHEN $3::text IS NULL THEN user_profiles.location ELSE EXCLUDED.location END, \
                 company = CASE WHEN $4::text IS NULL THEN user_profiles.company ELSE EXCLUDED.company END \
             RETURNING user_id, website, location, company",
        )
        .bind(params.user_id)
        .bind(&params.website)
        .bind(&params.location)
        .bind(&params.company)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok((user.into(), profile.into()))
    }
}

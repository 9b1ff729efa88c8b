//! Account lifecycle: registration, sessions, token rotation and password resets.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::application::kv::{
    KvError, KvStore, blacklist_key, password_reset_key, refresh_token_key,
};
use crate::application::mailer::{Mailer, password_reset_email, welcome_email};
use crate::application::passwords::PasswordHasher;
use crate::application::repos::{CreateUserParams, RepoError, UpdateProfileParams, UsersRepo};
use crate::application::tokens::{Claims, IssuedToken, TokenCodec, TokenError};
use crate::domain::entities::{UserProfileRecord, UserRecord};
use crate::domain::error::ValidationErrors;
use crate::domain::types::{TokenKind, UserRole};
use crate::domain::users::{
    ProfileChanges, Registration, check_new_password, normalize_email, validate_profile_changes,
    validate_registration,
};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("user with the email already exists")]
    EmailTaken,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("incorrect email or password")]
    InvalidCredentials,
    #[error("inactive user")]
    Inactive,
    #[error("authentication required")]
    MissingToken,
    #[error("token has been revoked")]
    Revoked,
    #[error("could not validate credentials: {0}")]
    InvalidToken(#[source] TokenError),
    #[error("user not found")]
    UserNotFound,
    #[error("invalid refresh token")]
    InvalidRefresh,
    #[error("invalid or expired reset token")]
    InvalidResetToken,
    #[error("not enough permissions")]
    Forbidden,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Store(#[from] KvError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user: UserRecord,
    pub claims: Claims,
}

impl Principal {
    pub fn require_role(&self, required: UserRole) -> Result<(), AuthError> {
        if self.user.has_role(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerifyOutcome {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<&'static str>,
}

impl VerifyOutcome {
    fn rejected(error: &'static str) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    store: Arc<dyn KvStore>,
    tokens: TokenCodec,
    hasher: PasswordHasher,
    mailer: Arc<dyn Mailer>,
    reset_url: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        store: Arc<dyn KvStore>,
        tokens: TokenCodec,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
        reset_url: impl Into<String>,
    ) -> Self {
        Self {
            users,
            store,
            tokens,
            hasher,
            mailer,
            reset_url: reset_url.into(),
        }
    }

    pub async fn register(&self, input: Registration<'_>) -> Result<UserRecord, AuthError> {
        validate_registration(&input)?;
        let email = normalize_email(input.email);
        let username = input.username.trim();

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        if self.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let hashed_password = self.hash_password(input.password).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                email,
                username: username.to_string(),
                full_name: input
                    .full_name
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
                hashed_password,
                role: UserRole::User,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { constraint } if constraint.contains("username") => {
                    AuthError::UsernameTaken
                }
                RepoError::Duplicate { .. } => AuthError::EmailTaken,
                other => AuthError::Repo(other),
            })?;

        info!(
            target = "quire::auth",
            user_id = user.id,
            username = %user.username,
            "user registered"
        );

        let mailer = Arc::clone(&self.mailer);
        let message = welcome_email(&user.email, &user.username);
        tokio::spawn(async move {
            if let Err(err) = mailer.send(message).await {
                warn!(target = "quire::auth", error = %err, "welcome email failed");
            }
        });

        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !self.verify_password(password, &user.hashed_password).await? {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        self.users
            .record_login(user.id, OffsetDateTime::now_utc())
            .await?;
        let pair = self.issue_pair(&user).await?;
        info!(target = "quire::auth", user_id = user.id, "user logged in");
        Ok(pair)
    }

    /// Resolve a bearer access token to its user.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self
            .tokens
            .decode_kind(token, TokenKind::Access)
            .map_err(AuthError::InvalidToken)?;

        if self.store.exists(&blacklist_key(&claims.jti)).await? {
            return Err(AuthError::Revoked);
        }

        let user = self.owner_of(&claims).await?.ok_or(AuthError::UserNotFound)?;
        if claims.ver != Some(user.token_version) {
            return Err(AuthError::Revoked);
        }
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        Ok(Principal { user, claims })
    }

    /// Revoke the presented access token and forget the stored refresh token.
    pub async fn logout(&self, principal: &Principal) -> Result<(), AuthError> {
        let remaining = principal
            .claims
            .remaining(OffsetDateTime::now_utc())
            .unsigned_abs()
            .max(StdDuration::from_secs(1));
        self.store
            .set_ex(&blacklist_key(&principal.claims.jti), "1", remaining)
            .await?;
        self.store
            .delete(&refresh_token_key(principal.user.id))
            .await?;
        info!(
            target = "quire::auth",
            user_id = principal.user.id,
            "user logged out"
        );
        Ok(())
    }

    pub async fn profile(
        &self,
        user: &UserRecord,
    ) -> Result<Option<UserProfileRecord>, AuthError> {
        Ok(self.users.find_profile(user.id).await?)
    }

    pub async fn update_profile(
        &self,
        user: &UserRecord,
        changes: ProfileChanges<'_>,
    ) -> Result<(UserRecord, UserProfileRecord), AuthError> {
        validate_profile_changes(&changes)?;
        let owned = |value: Option<&str>| value.map(|v| v.trim().to_string());
        let updated = self
            .users
            .update_profile(UpdateProfileParams {
                user_id: user.id,
                full_name: owned(changes.full_name),
                bio: owned(changes.bio),
                avatar_url: owned(changes.avatar_url),
                website: owned(changes.website),
                location: owned(changes.location),
                company: owned(changes.company),
            })
            .await?;
        Ok(updated)
    }

    /// Exchange a refresh token for a new pair. The presented token stops working.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .decode_kind(refresh_token, TokenKind::Refresh)
            .map_err(|err| {
                debug!(target = "quire::auth", error = %err, "refresh token rejected");
                AuthError::InvalidRefresh
            })?;
        let user = self
            .owner_of(&claims)
            .await?
            .ok_or(AuthError::InvalidRefresh)?;
        if !user.is_active {
            return Err(AuthError::Inactive);
        }

        // Taking the stored token means only one concurrent exchange can win. A
        // stale token also ends the current session.
        let stored = self.store.take(&refresh_token_key(user.id)).await?;
        if !matches_stored(stored.as_deref(), refresh_token) {
            if stored.is_some() {
                warn!(
                    target = "quire::auth",
                    user_id = user.id,
                    "superseded refresh token presented; session revoked"
                );
            }
            return Err(AuthError::InvalidRefresh);
        }

        self.issue_pair(&user).await
    }

    /// Report whether a token is currently usable. Never fails on a bad token.
    pub async fn verify(&self, token: &str) -> Result<VerifyOutcome, AuthError> {
        let claims = match self.tokens.decode(token) {
            Ok(claims) => claims,
            Err(TokenError::Expired) => return Ok(VerifyOutcome::rejected("Token has expired")),
            Err(_) => return Ok(VerifyOutcome::rejected("Invalid token")),
        };

        if self.store.exists(&blacklist_key(&claims.jti)).await? {
            return Ok(VerifyOutcome::rejected("Token has been revoked"));
        }
        if claims.kind == TokenKind::Access {
            match self.owner_of(&claims).await? {
                None => return Ok(VerifyOutcome::rejected("User not found")),
                Some(user) if claims.ver != Some(user.token_version) => {
                    return Ok(VerifyOutcome::rejected("Token has been revoked"));
                }
                Some(_) => {}
            }
        }

        Ok(VerifyOutcome {
            valid: true,
            claims: Some(claims),
            error: None,
        })
    }

    /// Always succeeds for unknown addresses so callers cannot probe for accounts.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            debug!(target = "quire::auth", "password reset requested for unknown email");
            return Ok(());
        };
        if !user.is_active {
            debug!(
                target = "quire::auth",
                user_id = user.id,
                "password reset requested for inactive user"
            );
            return Ok(());
        }

        let issued = self.tokens.issue_reset(&user).map_err(internal)?;
        self.store
            .set_ex(
                &password_reset_key(user.id),
                &issued.token,
                self.tokens.ttls().reset.unsigned_abs(),
            )
            .await?;

        let message = password_reset_email(
            &user.email,
            &self.reset_url,
            &issued.token,
            self.tokens.ttls().reset.whole_minutes(),
        );
        if let Err(err) = self.mailer.send(message).await {
            warn!(
                target = "quire::auth",
                user_id = user.id,
                error = %err,
                "password reset email failed"
            );
        } else {
            info!(
                target = "quire::auth",
                user_id = user.id,
                "password reset email sent"
            );
        }
        Ok(())
    }

    /// Set a new password from a reset token. Sessions opened before the reset end.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        let mut errors = ValidationErrors::new();
        check_new_password(
            &mut errors,
            "new_password",
            "confirm_password",
            new_password,
            confirm_password,
        );
        errors.into_result()?;

        let claims = self
            .tokens
            .decode_kind(token, TokenKind::Reset)
            .map_err(|_| AuthError::InvalidResetToken)?;
        let user = self
            .owner_of(&claims)
            .await?
            .filter(|user| user.email == claims.sub)
            .ok_or(AuthError::InvalidResetToken)?;

        let stored = self.store.get(&password_reset_key(user.id)).await?;
        if !matches_stored(stored.as_deref(), token) {
            return Err(AuthError::InvalidResetToken);
        }

        let hashed = self.hash_password(new_password).await?;
        self.users.update_password(user.id, &hashed).await?;
        self.store.delete(&password_reset_key(user.id)).await?;
        self.store.delete(&refresh_token_key(user.id)).await?;

        info!(target = "quire::auth", user_id = user.id, "password reset");
        Ok(())
    }

    async fn owner_of(&self, claims: &Claims) -> Result<Option<UserRecord>, AuthError> {
        let user = match claims.user_id {
            Some(id) => self.users.find_by_id(id).await?,
            None => self.users.find_by_email(&claims.sub).await?,
        };
        Ok(user)
    }

    async fn issue_pair(&self, user: &UserRecord) -> Result<TokenPair, AuthError> {
        let access = self.tokens.issue_access(user).map_err(internal)?;
        let refresh = self.tokens.issue_refresh(user).map_err(internal)?;
        self.store
            .set_ex(
                &refresh_token_key(user.id),
                &refresh.token,
                self.tokens.ttls().refresh.unsigned_abs(),
            )
            .await?;
        Ok(TokenPair {
            access,
            refresh,
            expires_in: self.tokens.ttls().access.whole_seconds(),
        })
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(internal)?
            .map_err(internal)
    }

    async fn verify_password(&self, password: &str, stored: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let stored = stored.to_string();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored))
            .await
            .map_err(internal)
    }
}

fn internal(err: impl std::fmt::Display) -> AuthError {
    AuthError::Internal(err.to_string())
}

/// Constant-time comparison against the token kept in the store.
fn matches_stored(stored: Option<&str>, presented: &str) -> bool {
    stored.is_some_and(|stored| bool::from(stored.as_bytes().ct_eq(presented.as_bytes())))
}

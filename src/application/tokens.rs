//! HS256 JSON Web Tokens for access, refresh and password-reset flows.

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::entities::UserRecord;
use crate::domain::types::{TokenKind, UserRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ver: Option<i32>,
}

impl Claims {
    pub fn expires_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.exp).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    /// Time left before expiry, clamped at zero.
    pub fn remaining(&self, now: OffsetDateTime) -> Duration {
        (self.expires_at() - now).max(Duration::ZERO)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid: {0}")]
    Invalid(String),
    #[error("expected a {expected} token, got {found}")]
    WrongKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy)]
pub struct TokenTtls {
    pub access: Duration,
    pub refresh: Duration,
    pub reset: Duration,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttls: TokenTtls,
}

impl TokenCodec {
    pub fn new(secret: &[u8], ttls: TokenTtls) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttls,
        }
    }

    pub fn ttls(&self) -> TokenTtls {
        self.ttls
    }

    pub fn issue_access(&self, user: &UserRecord) -> Result<IssuedToken, TokenError> {
        let mut claims = self.base_claims(user, TokenKind::Access, self.ttls.access);
        claims.user_id = Some(user.id);
        claims.username = Some(user.username.clone());
        claims.role = Some(user.role);
        claims.is_superuser = Some(user.is_superuser);
        claims.ver = Some(user.token_version);
        self.sign(claims)
    }

    pub fn issue_refresh(&self, user: &UserRecord) -> Result<IssuedToken, TokenError> {
        let mut claims = self.base_claims(user, TokenKind::Refresh, self.ttls.refresh);
        claims.user_id = Some(user.id);
        self.sign(claims)
    }

    pub fn issue_reset(&self, user: &UserRecord) -> Result<IssuedToken, TokenError> {
        let mut claims = self.base_claims(user, TokenKind::Reset, self.ttls.reset);
        claims.user_id = Some(user.id);
        self.sign(claims)
    }

    /// Check signature and expiry without looking at the token's purpose.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            })
    }

    pub fn decode_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected: expected.as_str(),
                found: claims.kind.as_str(),
            });
        }
        Ok(claims)
    }

    fn base_claims(&self, user: &UserRecord, kind: TokenKind, ttl: Duration) -> Claims {
        let now = OffsetDateTime::now_utc();
        Claims {
            sub: user.email.clone(),
            exp: (now + ttl).unix_timestamp(),
            iat: now.unix_timestamp(),
            jti: Uuid::new_v4().to_string(),
            kind,
            user_id: None,
            username: None,
            role: None,
            is_superuser: None,
            ver: None,
        }
    }

    fn sign(&self, claims: Claims) -> Result<IssuedToken, TokenError> {
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))?;
        Ok(IssuedToken { token, claims })
    }
}

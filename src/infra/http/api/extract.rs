//! Request extractors that reject with the API error envelope.

use axum::extract::rejection::{FormRejection, JsonRejection, QueryRejection};
use axum::extract::{Form, FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::Json;
use axum::http::request::Parts;
use tracing::debug;

use crate::application::auth::Principal;
use crate::domain::entities::UserRecord;

use super::error::ApiError;
use super::handlers::auth_to_api;
use super::middleware::extract_token;
use super::state::ApiState;

/// The authenticated caller; requests without a valid bearer token are rejected.
pub struct CurrentUser(pub Principal);

impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts.headers.get(AUTHORIZATION))
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
        let principal = state
            .auth
            .authenticate(&token)
            .await
            .map_err(auth_to_api)?;
        Ok(Self(principal))
    }
}

/// The caller when a usable bearer token is present, otherwise anonymous.
pub struct MaybeUser(pub Option<Principal>);

impl FromRequestParts<ApiState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ApiState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_token(parts.headers.get(AUTHORIZATION)) else {
            return Ok(Self(None));
        };
        match state.auth.authenticate(&token).await {
            Ok(principal) => Ok(Self(Some(principal))),
            Err(err) => {
                debug!(
                    target = "quire::http::auth",
                    error = %err,
                    "ignoring unusable bearer token on public route"
                );
                Ok(Self(None))
            }
        }
    }
}

impl MaybeUser {
    pub fn user(&self) -> Option<&UserRecord> {
        self.0.as_ref().map(|principal| &principal.user)
    }
}

pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::malformed(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiForm<T>(pub T);

impl<T, S> FromRequest<S> for ApiForm<T>
where
    Form<T>: FromRequest<S, Rejection = FormRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::malformed(rejection.body_text()))?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::malformed(rejection.body_text()))?;
        Ok(Self(value))
    }
}

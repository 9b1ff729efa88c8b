use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use quire_api_types::{
    LoginForm, MessageResponse, PasswordResetConfirm, PasswordResetRequest, RefreshRequest,
    RegisterRequest, UpdateMeRequest, VerifyRequest, VerifyResponse,
};

use crate::domain::users::{ProfileChanges, Registration};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{ApiForm, ApiJson, CurrentUser};
use crate::infra::http::api::models::{token_response, user_response, user_with_profile};
use crate::infra::http::api::state::ApiState;

use super::auth_to_api;

const RESET_REQUESTED_MESSAGE: &str =
    "If the email exists, a password reset link has been sent";

pub async fn register(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .auth
        .register(Registration {
            email: &payload.email,
            username: &payload.username,
            full_name: payload.full_name.as_deref(),
            password: &payload.password,
            confirm_password: &payload.confirm_password,
        })
        .await
        .map_err(auth_to_api)?;
    Ok((StatusCode::CREATED, Json(user_response(user))))
}

pub async fn login(
    State(state): State<ApiState>,
    ApiForm(form): ApiForm<LoginForm>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .auth
        .login(&form.username, &form.password)
        .await
        .map_err(auth_to_api)?;
    Ok(Json(token_response(pair)))
}

pub async fn logout(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.logout(&principal).await.map_err(auth_to_api)?;
    Ok(Json(MessageResponse::new("Successfully logged out")))
}

pub async fn me(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .auth
        .profile(&principal.user)
        .await
        .map_err(auth_to_api)?;
    Ok(Json(user_with_profile(principal.user, profile)))
}

pub async fn update_me(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
    ApiJson(payload): ApiJson<UpdateMeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = ProfileChanges {
        full_name: payload.full_name.as_deref(),
        bio: payload.bio.as_deref(),
        avatar_url: payload.avatar_url.as_deref(),
        website: payload.website.as_deref(),
        location: payload.location.as_deref(),
        company: payload.company.as_deref(),
    };
    let (user, profile) = state
        .auth
        .update_profile(&principal.user, changes)
        .await
        .map_err(auth_to_api)?;
    Ok(Json(user_with_profile(user, Some(profile))))
}

pub async fn refresh(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pair = state
        .auth
        .refresh(&payload.refresh_token)
        .await
        .map_err(auth_to_api)?;
    Ok(Json(token_response(pair)))
}

pub async fn verify(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<VerifyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .auth
        .verify(&payload.token)
        .await
        .map_err(auth_to_api)?;
    let payload = outcome
        .claims
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(VerifyResponse {
        valid: outcome.valid,
        payload,
        error: outcome.error.map(str::to_string),
    }))
}

pub async fn request_password_reset(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth
        .request_password_reset(&payload.email)
        .await
        .map_err(auth_to_api)?;
    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

pub async fn reset_password(
    State(state): State<ApiState>,
    ApiJson(payload): ApiJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .auth
        .reset_password(
            &payload.token,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await
        .map_err(auth_to_api)?;
    Ok(Json(MessageResponse::new("Password has been reset successfully")))
}

//! API handlers organized by resource type.
//!
//! Error conversions shared by every resource live here.

mod auth;
mod categories;
mod health;
mod posts;

pub use auth::*;
pub use categories::*;
pub use health::*;
pub use posts::*;

// ----- Shared query structs -----

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::domain::types::PostOrder;

#[derive(Debug, Default, Deserialize)]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub published_only: Option<bool>,
    pub author_id: Option<i64>,
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub order_by: Option<PostOrder>,
    pub order_desc: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PopularQuery {
    pub days: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub author_id: Option<i64>,
}

// ----- Shared error conversions -----

use axum::http::StatusCode;

use crate::application::auth::AuthError;
use crate::application::categories::CategoryError;
use crate::application::pagination::PaginationError;
use crate::application::posts::PostError;
use crate::application::repos::RepoError;
use crate::domain::error::ValidationErrors;
use crate::domain::slug::SlugError;

use super::error::{ApiError, codes};

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::InvalidInput { message } => ApiError::bad_request("Invalid input", Some(message)),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::CONFLICT,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::unavailable(Some("database timeout".to_string())),
        RepoError::Unavailable(message) => {
            warn!(target = "quire::http", %message, "database unavailable");
            ApiError::unavailable(Some("database unavailable".to_string()))
        }
        RepoError::Persistence(message) => ApiError::internal(message),
    }
}

pub(crate) fn auth_to_api(err: AuthError) -> ApiError {
    match err {
        AuthError::Validation(errors) => ApiError::validation(&errors),
        AuthError::EmailTaken => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "User with the email already exists",
            None,
        ),
        AuthError::UsernameTaken => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Username is already taken",
            None,
        ),
        AuthError::InvalidCredentials => ApiError::unauthorized("Incorrect email or password"),
        AuthError::Inactive => ApiError::bad_request("Inactive user", None),
        AuthError::MissingToken => ApiError::unauthorized("Authentication required"),
        AuthError::Revoked => ApiError::unauthorized("Token has been revoked"),
        AuthError::InvalidToken(_) => ApiError::unauthorized("Could not validate credentials"),
        AuthError::UserNotFound => ApiError::not_found("User not found"),
        AuthError::InvalidRefresh => ApiError::unauthorized("Invalid refresh token"),
        AuthError::InvalidResetToken => {
            ApiError::bad_request("Invalid or expired reset token", None)
        }
        AuthError::Forbidden => ApiError::forbidden(),
        AuthError::Repo(err) => repo_to_api(err),
        AuthError::Store(err) => ApiError::unavailable(Some(err.to_string())),
        AuthError::Internal(message) => ApiError::internal(message),
    }
}

fn slug_to_api(err: SlugError, field: &'static str) -> ApiError {
    match err {
        SlugError::Exhausted { .. } => ApiError::conflict("Could not allocate a unique slug"),
        other => ApiError::validation(&ValidationErrors::single(field, "slug", other.to_string())),
    }
}

pub(crate) fn post_to_api(err: PostError) -> ApiError {
    match err {
        PostError::Validation(errors) => ApiError::validation(&errors),
        PostError::NotFound => ApiError::not_found("Post not found"),
        PostError::Forbidden => ApiError::forbidden(),
        PostError::Slug(err) => slug_to_api(err, "title"),
        PostError::Repo(err) => repo_to_api(err),
    }
}

pub(crate) fn category_to_api(err: CategoryError) -> ApiError {
    match err {
        CategoryError::Validation(errors) => ApiError::validation(&errors),
        CategoryError::Forbidden => ApiError::forbidden(),
        CategoryError::NameTaken => {
            ApiError::conflict("A category with this name already exists")
        }
        CategoryError::Slug(err) => slug_to_api(err, "name"),
        CategoryError::Repo(err) => repo_to_api(err),
    }
}

pub(crate) fn pagination_to_api(err: PaginationError) -> ApiError {
    let field = match err {
        PaginationError::PageOutOfRange => "page",
        PaginationError::SizeOutOfRange => "size",
    };
    ApiError::validation(&ValidationErrors::single(field, "range", err.to_string()))
}

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use quire_api_types::CategoryCreateRequest;

use crate::application::categories::NewCategory;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{ApiJson, CurrentUser};
use crate::infra::http::api::models::category_response;
use crate::infra::http::api::state::ApiState;

use super::category_to_api;

pub async fn list_categories(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let categories = state.categories.list().await.map_err(category_to_api)?;
    Ok(Json(
        categories
            .into_iter()
            .map(category_response)
            .collect::<Vec<_>>(),
    ))
}

pub async fn create_category(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
    ApiJson(payload): ApiJson<CategoryCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let category = state
        .categories
        .create(
            &principal.user,
            NewCategory {
                name: payload.name,
                description: payload.description,
                is_featured: payload.is_featured,
                display_order: payload.display_order,
            },
        )
        .await
        .map_err(category_to_api)?;
    Ok((StatusCode::CREATED, Json(category_response(category))))
}

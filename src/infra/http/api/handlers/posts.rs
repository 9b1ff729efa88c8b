use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use quire_api_types::{PostCreateRequest, PostUpdateRequest};
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::application::posts::{ListPostsQuery, NewPost, PostChanges};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{ApiJson, ApiQuery, CurrentUser, MaybeUser};
use crate::infra::http::api::models::{
    page_response, post_response, search_result, statistics_response,
};
use crate::infra::http::api::state::ApiState;

use super::{
    PopularQuery, PostListQuery, SearchQuery, StatisticsQuery, pagination_to_api, post_to_api,
};

pub async fn list_posts(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    ApiQuery(query): ApiQuery<PostListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::new(query.page, query.size).map_err(pagination_to_api)?;
    let defaults = ListPostsQuery::default();
    let query = ListPostsQuery {
        page,
        published_only: query.published_only.unwrap_or(defaults.published_only),
        author_id: query.author_id,
        category_id: query.category_id,
        tag: query.tag,
        search: query.search,
        order_by: query.order_by.unwrap_or(defaults.order_by),
        order_desc: query.order_desc.unwrap_or(defaults.order_desc),
    };

    let page = state
        .posts
        .list(viewer.user(), query)
        .await
        .map_err(post_to_api)?;
    Ok(Json(page_response(page, post_response)))
}

pub async fn search_posts(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let hits = state
        .posts
        .search(&query.q, query.limit)
        .await
        .map_err(post_to_api)?;
    Ok(Json(hits.into_iter().map(search_result).collect::<Vec<_>>()))
}

pub async fn popular_posts(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<PopularQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let posts = state
        .posts
        .popular(query.days, query.limit)
        .await
        .map_err(post_to_api)?;
    Ok(Json(posts.into_iter().map(post_response).collect::<Vec<_>>()))
}

pub async fn post_statistics(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<StatisticsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .posts
        .statistics(query.author_id)
        .await
        .map_err(post_to_api)?;
    Ok(Json(statistics_response(stats)))
}

pub async fn get_post(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .posts
        .get(viewer.user(), id)
        .await
        .map_err(post_to_api)?;
    Ok(Json(post_response(post)))
}

pub async fn get_post_by_slug(
    State(state): State<ApiState>,
    viewer: MaybeUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state
        .posts
        .get_by_slug(viewer.user(), &slug)
        .await
        .map_err(post_to_api)?;
    Ok(Json(post_response(post)))
}

pub async fn create_post(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
    ApiJson(payload): ApiJson<PostCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = NewPost {
        title: payload.title,
        content: payload.content,
        excerpt: payload.excerpt,
        published: payload.published,
        tags: payload.tags,
        category_ids: payload.category_ids,
    };
    let post = state
        .posts
        .create(&principal.user, input)
        .await
        .map_err(post_to_api)?;
    Ok((StatusCode::CREATED, Json(post_response(post))))
}

pub async fn update_post(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<PostUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let changes = PostChanges {
        title: payload.title,
        content: payload.content,
        excerpt: payload.excerpt,
        published: payload.published,
        tags: payload.tags,
        category_ids: payload.category_ids,
    };
    let post = state
        .posts
        .update(&principal.user, id, changes)
        .await
        .map_err(post_to_api)?;
    Ok(Json(post_response(post)))
}

pub async fn delete_post(
    State(state): State<ApiState>,
    CurrentUser(principal): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .posts
        .delete(&principal.user, id)
        .await
        .map_err(post_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

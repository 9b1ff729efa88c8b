//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::domain::entities::{
    CategoryRecord, PostSearchHit, PostStatistics, PostView, UserProfileRecord, UserRecord,
};
use crate::domain::types::{PostOrder, UserRole};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileParams {
    pub user_id: i64,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
}

/// Which unpublished posts a listing may include besides published ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DraftScope {
    #[default]
    None,
    OwnedBy(i64),
    All,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PostListFilter {
    pub drafts: DraftScope,
    pub author_id: Option<i64>,
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub order_by: PostOrder,
    pub order_desc: bool,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub published_at: Option<OffsetDateTime>,
    pub tags: Vec<String>,
    pub author_id: i64,
    pub category_ids: Vec<Uuid>,
}

/// Full replacement values for a stored post; `category_ids` of `None` keeps the links.
#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub published_at: Option<OffsetDateTime>,
    pub tags: Vec<String>,
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone)]
pub struct CreateCategoryParams {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_featured: bool,
    pub display_order: i32,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_profile(&self, user_id: i64) -> Result<Option<UserProfileRecord>, RepoError>;

    async fn record_login(&self, id: i64, at: OffsetDateTime) -> Result<(), RepoError>;

    /// Store a new hash and bump `token_version`, returning the updated user.
    async fn update_password(
        &self,
        id: i64,
        hashed_password: &str,
    ) -> Result<UserRecord, RepoError>;

    async fn update_profile(
        &self,
        params: UpdateProfileParams,
    ) -> Result<(UserRecord, UserProfileRecord), RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest,
    ) -> Result<Page<PostView>, RepoError>;

    async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<PostSearchHit>, RepoError>;

    async fn popular_posts(
        &self,
        since: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<PostView>, RepoError>;

    async fn statistics(&self, author_id: Option<i64>) -> Result<PostStatistics, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostView>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostView>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    /// Returns the new view count, or `None` when the post does not exist.
    async fn increment_views(&self, id: Uuid) -> Result<Option<i64>, RepoError>;

    async fn create_post(&self, params: CreatePostParams) -> Result<PostView, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostView, RepoError>;

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;
}

#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

//! Post reads and writes with visibility and ownership rules.

use std::sync::Arc;

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::info;
use uuid::Uuid;

use crate::application::cache::{CacheScope, ResponseCache};
use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreatePostParams, DraftScope, PostListFilter, PostsRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{PostSearchHit, PostStatistics, PostView, UserRecord};
use crate::domain::error::ValidationErrors;
use crate::domain::posts::{PostFields, normalize_tags, validate_post_fields};
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async};
use crate::domain::types::PostOrder;

pub const SEARCH_MIN_QUERY_LEN: usize = 3;
pub const SEARCH_DEFAULT_LIMIT: u32 = 20;
pub const SEARCH_MAX_LIMIT: u32 = 100;
pub const POPULAR_DEFAULT_DAYS: u32 = 7;
pub const POPULAR_MAX_DAYS: u32 = 365;
pub const POPULAR_DEFAULT_LIMIT: u32 = 10;
pub const POPULAR_MAX_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("post not found")]
    NotFound,
    #[error("not enough permissions")]
    Forbidden,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for PostError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(err) => PostError::Slug(err),
            SlugAsyncError::Predicate(err) => PostError::Repo(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListPostsQuery {
    pub page: PageRequest,
    pub published_only: bool,
    pub author_id: Option<i64>,
    pub category_id: Option<Uuid>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub order_by: PostOrder,
    pub order_desc: bool,
}

impl Default for ListPostsQuery {
    fn default() -> Self {
        Self {
            page: PageRequest::default(),
            published_only: true,
            author_id: None,
            category_id: None,
            tag: None,
            search: None,
            order_by: PostOrder::default(),
            order_desc: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    pub category_ids: Vec<Uuid>,
}

/// Partial edit; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub published: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    cache: ResponseCache,
}

impl PostService {
    pub fn new(posts: Arc<dyn PostsRepo>, cache: ResponseCache) -> Self {
        Self { posts, cache }
    }

    pub async fn list(
        &self,
        viewer: Option<&UserRecord>,
        query: ListPostsQuery,
    ) -> Result<Page<PostView>, PostError> {
        let drafts = if query.published_only {
            DraftScope::None
        } else {
            match viewer {
                Some(user) if user.can_moderate() => DraftScope::All,
                Some(user) => DraftScope::OwnedBy(user.id),
                None => DraftScope::None,
            }
        };
        let filter = PostListFilter {
            drafts,
            author_id: query.author_id,
            category_id: query.category_id,
            tag: non_blank(query.tag),
            search: non_blank(query.search),
            order_by: query.order_by,
            order_desc: query.order_desc,
        };
        let page = query.page;

        if filter.drafts != DraftScope::None {
            return Ok(self.posts.list_posts(&filter, page).await?);
        }
        let key = (filter.clone(), page);
        let posts = Arc::clone(&self.posts);
        self.cache
            .get_or_load(CacheScope::PostList, &key, || async move {
                posts.list_posts(&filter, page).await.map_err(PostError::from)
            })
            .await
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PostSearchHit>, PostError> {
        let query = query.trim().to_string();
        let limit = limit.unwrap_or(SEARCH_DEFAULT_LIMIT);
        let mut errors = ValidationErrors::new();
        errors.ensure(
            query.chars().count() >= SEARCH_MIN_QUERY_LEN,
            "q",
            "length",
            "Query must be at least 3 characters",
        );
        errors.ensure(
            (1..=SEARCH_MAX_LIMIT).contains(&limit),
            "limit",
            "range",
            "Limit must be between 1 and 100",
        );
        errors.into_result()?;

        let key = (query.clone(), limit);
        let posts = Arc::clone(&self.posts);
        self.cache
            .get_or_load(CacheScope::Search, &key, || async move {
                posts
                    .search_posts(&query, limit)
                    .await
                    .map_err(PostError::from)
            })
            .await
    }

    pub async fn popular(
        &self,
        days: Option<u32>,
        limit: Option<u32>,
    ) -> Result<Vec<PostView>, PostError> {
        let days = days.unwrap_or(POPULAR_DEFAULT_DAYS);
        let limit = limit.unwrap_or(POPULAR_DEFAULT_LIMIT);
        let mut errors = ValidationErrors::new();
        errors.ensure(
            (1..=POPULAR_MAX_DAYS).contains(&days),
            "days",
            "range",
            "Days must be between 1 and 365",
        );
        errors.ensure(
            (1..=POPULAR_MAX_LIMIT).contains(&limit),
            "limit",
            "range",
            "Limit must be between 1 and 50",
        );
        errors.into_result()?;

        let posts = Arc::clone(&self.posts);
        self.cache
            .get_or_load(CacheScope::Popular, &(days, limit), || async move {
                let since = OffsetDateTime::now_utc() - Duration::days(i64::from(days));
                posts
                    .popular_posts(since, limit)
                    .await
                    .map_err(PostError::from)
            })
            .await
    }

    pub async fn statistics(&self, author_id: Option<i64>) -> Result<PostStatistics, PostError> {
        let posts = Arc::clone(&self.posts);
        self.cache
            .get_or_load(CacheScope::Statistics, &author_id, || async move {
                posts.statistics(author_id).await.map_err(PostError::from)
            })
            .await
    }

    /// Read one post and count the view.
    pub async fn get(&self, viewer: Option<&UserRecord>, id: Uuid) -> Result<PostView, PostError> {
        let view = self.posts.find_by_id(id).await?;
        self.count_view(viewer, view).await
    }

    pub async fn get_by_slug(
        &self,
        viewer: Option<&UserRecord>,
        slug: &str,
    ) -> Result<PostView, PostError> {
        let view = self.posts.find_by_slug(slug).await?;
        self.count_view(viewer, view).await
    }

    pub async fn create(&self, author: &UserRecord, input: NewPost) -> Result<PostView, PostError> {
        let excerpt = non_blank(input.excerpt);
        validate_post_fields(&PostFields {
            title: Some(&input.title),
            content: Some(&input.content),
            excerpt: excerpt.as_deref(),
            tags: Some(&input.tags),
        })?;

        let title = input.title.trim().to_string();
        let slug = self.unique_slug(&title, None).await?;
        let published_at = input.published.then(OffsetDateTime::now_utc);

        let view = self
            .posts
            .create_post(CreatePostParams {
                title,
                slug,
                content: input.content,
                excerpt,
                published: input.published,
                published_at,
                tags: normalize_tags(input.tags),
                author_id: author.id,
                category_ids: dedupe(input.category_ids),
            })
            .await
            .map_err(unknown_category)?;

        self.cache.invalidate().await;
        info!(
            target = "quire::posts",
            post_id = %view.post.id,
            slug = %view.post.slug,
            author_id = author.id,
            "post created"
        );
        Ok(view)
    }

    pub async fn update(
        &self,
        editor: &UserRecord,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<PostView, PostError> {
        let existing = self.posts.find_by_id(id).await?.ok_or(PostError::NotFound)?;
        ensure_can_edit(editor, &existing)?;

        validate_post_fields(&PostFields {
            title: changes.title.as_deref(),
            content: changes.content.as_deref(),
            excerpt: changes.excerpt.as_deref(),
            tags: changes.tags.as_deref(),
        })?;

        let current = existing.post;
        let (title, slug) = match changes.title {
            Some(title) if title.trim() != current.title => {
                let title = title.trim().to_string();
                let slug = self.unique_slug(&title, Some(&current.slug)).await?;
                (title, slug)
            }
            _ => (current.title, current.slug),
        };
        let published = changes.published.unwrap_or(current.published);
        let published_at = match current.published_at {
            None if published => Some(OffsetDateTime::now_utc()),
            other => other,
        };
        let excerpt = match changes.excerpt {
            Some(excerpt) => non_blank(Some(excerpt)),
            None => current.excerpt,
        };

        let view = self
            .posts
            .update_post(UpdatePostParams {
                id,
                title,
                slug,
                content: changes.content.unwrap_or(current.content),
                excerpt,
                published,
                published_at,
                tags: changes.tags.map(normalize_tags).unwrap_or(current.tags),
                category_ids: changes.category_ids.map(dedupe),
            })
            .await
            .map_err(unknown_category)?;

        self.cache.invalidate().await;
        info!(
            target = "quire::posts",
            post_id = %id,
            editor_id = editor.id,
            "post updated"
        );
        Ok(view)
    }

    pub async fn delete(&self, editor: &UserRecord, id: Uuid) -> Result<(), PostError> {
        let existing = self.posts.find_by_id(id).await?.ok_or(PostError::NotFound)?;
        ensure_can_edit(editor, &existing)?;

        match self.posts.delete_post(id).await {
            Ok(()) => {}
            Err(RepoError::NotFound) => return Err(PostError::NotFound),
            Err(err) => return Err(err.into()),
        }

        self.cache.invalidate().await;
        info!(
            target = "quire::posts",
            post_id = %id,
            editor_id = editor.id,
            "post deleted"
        );
        Ok(())
    }

    async fn count_view(
        &self,
        viewer: Option<&UserRecord>,
        view: Option<PostView>,
    ) -> Result<PostView, PostError> {
        let mut view = view
            .filter(|view| view.visible_to(viewer))
            .ok_or(PostError::NotFound)?;
        let count = self
            .posts
            .increment_views(view.post.id)
            .await?
            .ok_or(PostError::NotFound)?;
        view.post.view_count = count;
        Ok(view)
    }

    /// `own` is the slug the post already holds, which never counts as taken.
    async fn unique_slug(&self, title: &str, own: Option<&str>) -> Result<String, PostError> {
        let posts = Arc::clone(&self.posts);
        let slug = generate_unique_slug_async(title, |candidate| {
            let posts = Arc::clone(&posts);
            let is_own = own == Some(candidate);
            let candidate = candidate.to_string();
            async move {
                if is_own {
                    return Ok(true);
                }
                posts.slug_exists(&candidate).await.map(|taken| !taken)
            }
        })
        .await?;
        Ok(slug)
    }
}

fn ensure_can_edit(editor: &UserRecord, view: &PostView) -> Result<(), PostError> {
    if editor.id == view.post.author_id || editor.can_moderate() {
        Ok(())
    } else {
        Err(PostError::Forbidden)
    }
}

/// Foreign-key failures on category links surface as a field error.
fn unknown_category(err: RepoError) -> PostError {
    match err {
        RepoError::Integrity { .. } => PostError::Validation(ValidationErrors::single(
            "category_ids",
            "reference",
            "Unknown category",
        )),
        other => PostError::Repo(other),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn dedupe(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

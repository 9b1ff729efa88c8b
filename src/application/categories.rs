use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::cache::{CacheScope, ResponseCache};
use crate::application::repos::{CategoriesRepo, CreateCategoryParams, RepoError};
use crate::domain::entities::{CategoryRecord, UserRecord};
use crate::domain::error::ValidationErrors;
use crate::domain::posts::validate_category_name;
use crate::domain::slug::{SlugAsyncError, SlugError, generate_unique_slug_async};

#[derive(Debug, Error)]
pub enum CategoryError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("not enough permissions")]
    Forbidden,
    #[error("a category with this name already exists")]
    NameTaken,
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<SlugAsyncError<RepoError>> for CategoryError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(err) => CategoryError::Slug(err),
            SlugAsyncError::Predicate(err) => CategoryError::Repo(err),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub is_featured: bool,
    pub display_order: i32,
}

#[derive(Clone)]
pub struct CategoryService {
    categories: Arc<dyn CategoriesRepo>,
    cache: ResponseCache,
}

impl CategoryService {
    pub fn new(categories: Arc<dyn CategoriesRepo>, cache: ResponseCache) -> Self {
        Self { categories, cache }
    }

    /// Ordered by display order, then name.
    pub async fn list(&self) -> Result<Vec<CategoryRecord>, CategoryError> {
        let categories = Arc::clone(&self.categories);
        self.cache
            .get_or_load(CacheScope::Categories, &(), || async move {
                categories
                    .list_categories()
                    .await
                    .map_err(CategoryError::from)
            })
            .await
    }

    pub async fn create(
        &self,
        actor: &UserRecord,
        input: NewCategory,
    ) -> Result<CategoryRecord, CategoryError> {
        if !actor.can_moderate() {
            return Err(CategoryError::Forbidden);
        }
        validate_category_name(&input.name)?;

        let name = input.name.trim().to_string();
        let categories = Arc::clone(&self.categories);
        let slug = generate_unique_slug_async(&name, |candidate| {
            let categories = Arc::clone(&categories);
            let candidate = candidate.to_string();
            async move { categories.slug_exists(&candidate).await.map(|taken| !taken) }
        })
        .await?;

        let category = self
            .categories
            .create_category(CreateCategoryParams {
                name,
                slug,
                description: input
                    .description
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty()),
                is_featured: input.is_featured,
                display_order: input.display_order,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => CategoryError::NameTaken,
                other => CategoryError::Repo(other),
            })?;

        self.cache.invalidate().await;
        info!(
            target = "quire::categories",
            category_id = %category.id,
            slug = %category.slug,
            "category created"
        );
        Ok(category)
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{Page, PageRequest};
use crate::application::repos::{
    CreatePostParams, DraftScope, PostListFilter, PostsRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{
    AuthorSummary, CategoryRecord, PostRecord, PostSearchHit, PostStatistics, PostView,
};

use super::categories::CategoryRow;
use super::{PostgresRepositories, escape_like, map_sqlx_error};

const POST_SELECT: &str = "SELECT p.id, p.title, p.slug, p.content, p.excerpt, p.published, \
     p.published_at, p.view_count, p.like_count, p.comment_count, p.tags, p.author_id, \
     p.created_at, p.updated_at, u.username AS author_username, \
     u.full_name AS author_full_name, u.avatar_url AS author_avatar_url \
     FROM posts p INNER JOIN users u ON u.id = p.author_id ";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    slug: String,
    content: String,
    excerpt: Option<String>,
    published: bool,
    published_at: Option<OffsetDateTime>,
    view_count: i64,
    like_count: i64,
    comment_count: i64,
    tags: Vec<String>,
    author_id: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    author_username: String,
    author_full_name: Option<String>,
    author_avatar_url: Option<String>,
}

impl PostRow {
    fn into_view(self, categories: Vec<CategoryRecord>) -> PostView {
        PostView {
            author: AuthorSummary {
                id: self.author_id,
                username: self.author_username,
                full_name: self.author_full_name,
                avatar_url: self.author_avatar_url,
            },
            post: PostRecord {
                id: self.id,
                title: self.title,
                slug: self.slug,
                content: self.content,
                excerpt: self.excerpt,
                published: self.published,
                published_at: self.published_at,
                view_count: self.view_count,
                like_count: self.like_count,
                comment_count: self.comment_count,
                tags: self.tags,
                author_id: self.author_id,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            categories,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostCategoryRow {
    post_id: Uuid,
    #[sqlx(flatten)]
    category: CategoryRow,
}

#[derive(sqlx::FromRow)]
struct SearchRow {
    id: Uuid,
    title: String,
    excerpt: Option<String>,
    slug: String,
    author_id: i64,
    author_username: String,
    author_full_name: Option<String>,
    author_avatar_url: Option<String>,
    relevance: f32,
}

impl From<SearchRow> for PostSearchHit {
    fn from(row: SearchRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            excerpt: row.excerpt,
            slug: row.slug,
            author: AuthorSummary {
                id: row.author_id,
                username: row.author_username,
                full_name: row.author_full_name,
                avatar_url: row.author_avatar_url,
            },
            relevance: row.relevance,
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatisticsRow {
    total_posts: i64,
    total_views: i64,
    avg_views: f64,
    max_views: i64,
}

impl PostgresRepositories {
    fn apply_post_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q PostListFilter) {
        match filter.drafts {
            DraftScope::None => {
                qb.push(" AND p.published = TRUE ");
            }
            DraftScope::OwnedBy(user_id) => {
                qb.push(" AND (p.published = TRUE OR p.author_id = ");
                qb.push_bind(user_id);
                qb.push(") ");
            }
            DraftScope::All => {}
        }

        if let Some(author_id) = filter.author_id {
            qb.push(" AND p.author_id = ");
            qb.push_bind(author_id);
        }

        if let Some(category_id) = filter.category_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM post_categories pc WHERE pc.post_id = p.id AND pc.category_id = ",
            );
            qb.push_bind(category_id);
            qb.push(")");
        }

        if let Some(tag) = filter.tag.as_ref() {
            qb.push(" AND ");
            qb.push_bind(tag);
            qb.push(" = ANY(p.tags) ");
        }

        if let Some(search) = filter.search.as_ref() {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (p.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR p.content ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" ESCAPE '\\' OR p.excerpt ILIKE ");
            qb.push_bind(pattern);
            qb.push(" ESCAPE '\\')");
        }
    }

    /// Attach categories to each row with one extra query.
    async fn attach_categories(&self, rows: Vec<PostRow>) -> Result<Vec<PostView>, RepoError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let links = sqlx::query_as::<_, PostCategoryRow>(
            "SELECT pc.post_id, c.id, c.name, c.slug, c.description, c.is_featured, \
                    c.display_order, c.created_at \
             FROM post_categories pc INNER JOIN categories c ON c.id = pc.category_id \
             WHERE pc.post_id = ANY($1) \
             ORDER BY c.display_order, c.name",
        )
        .bind(&ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut by_post: HashMap<Uuid, Vec<CategoryRecord>> = HashMap::new();
        for link in links {
            by_post
                .entry(link.post_id)
                .or_default()
                .push(link.category.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let categories = by_post.remove(&row.id).unwrap_or_default();
                row.into_view(categories)
            })
            .collect())
    }

    async fn post_view_where(
        &self,
        column: &'static str,
        value: PostKey<'_>,
    ) -> Result<Option<PostView>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(POST_SELECT);
        qb.push(" WHERE p.");
        qb.push(column);
        qb.push(" = ");
        match value {
            PostKey::Id(id) => qb.push_bind(id),
            PostKey::Slug(slug) => qb.push_bind(slug),
        };

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.attach_categories(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn replace_post_categories(
        tx: &mut sqlx::PgConnection,
        post_id: Uuid,
        category_ids: &[Uuid],
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if category_ids.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "INSERT INTO post_categories (post_id, category_id) SELECT $1, UNNEST($2::uuid[])",
        )
        .bind(post_id)
        .bind(category_ids)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

enum PostKey<'a> {
    Id(Uuid),
    Slug(&'a str),
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest,
    ) -> Result<Page<PostView>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_post_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let offset = i64::try_from(page.offset())
            .map_err(|_| RepoError::InvalidInput {
                message: "page offset out of range".to_string(),
            })?;

        let mut qb = QueryBuilder::new(POST_SELECT);
        qb.push(" WHERE 1=1 ");
        Self::apply_post_filter(&mut qb, filter);
        qb.push(" ORDER BY p.");
        qb.push(filter.order_by.column());
        qb.push(if filter.order_desc {
            " DESC NULLS LAST"
        } else {
            " ASC NULLS LAST"
        });
        qb.push(", p.id DESC LIMIT ");
        qb.push_bind(i64::from(page.size()));
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        let items = self.attach_categories(rows).await?;

        Ok(Page::new(items, Self::convert_count(total)?, page))
    }

    async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<PostSearchHit>, RepoError> {
        let rows = sqlx::query_as::<_, SearchRow>(
            "SELECT p.id, p.title, p.excerpt, p.slug, p.author_id, \
                    u.username AS author_username, u.full_name AS author_full_name, \
                    u.avatar_url AS author_avatar_url, \
                    ts_rank(p.search_vector, q)::real AS relevance \
             FROM posts p \
             INNER JOIN users u ON u.id = p.author_id, \
             websearch_to_tsquery('english', $1) q \
             WHERE p.published = TRUE AND p.search_vector @@ q \
             ORDER BY relevance DESC, p.created_at DESC \
             LIMIT $2",
        )
        .bind(query)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostSearchHit::from).collect())
    }

    async fn popular_posts(
        &self,
        since: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<PostView>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(POST_SELECT);
        qb.push(" WHERE p.published = TRUE AND p.created_at >= ");
        qb.push_bind(since);
        qb.push(" ORDER BY p.view_count DESC, p.created_at DESC LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        self.attach_categories(rows).await
    }

    async fn statistics(&self, author_id: Option<i64>) -> Result<PostStatistics, RepoError> {
        let row = sqlx::query_as::<_, StatisticsRow>(
            "SELECT COUNT(*) AS total_posts, \
                    COALESCE(SUM(view_count), 0)::BIGINT AS total_views, \
                    COALESCE(AVG(view_count), 0)::FLOAT8 AS avg_views, \
                    COALESCE(MAX(view_count), 0)::BIGINT AS max_views \
             FROM posts \
             WHERE published = TRUE AND ($1::BIGINT IS NULL OR author_id = $1)",
        )
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(PostStatistics {
            total_posts: row.total_posts,
            total_views: row.total_views,
            avg_views: row.avg_views,
            max_views: row.max_views,
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostView>, RepoError> {
        self.post_view_where("id", PostKey::Id(id)).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostView>, RepoError> {
        self.post_view_where("slug", PostKey::Slug(slug)).await
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = $1 RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostView, RepoError> {
        let id = Uuid::new_v4();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO posts (id, title, slug, content, excerpt, published, published_at, \
                                tags, author_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(id)
        .bind(&params.title)
        .bind(&params.slug)
        .bind(&params.content)
        .bind(&params.excerpt)
        .bind(params.published)
        .bind(params.published_at)
        .bind(&params.tags)
        .bind(params.author_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::replace_post_categories(&mut tx, id, &params.category_ids).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        self.post_view_where("id", PostKey::Id(id))
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostView, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "UPDATE posts SET title = $2, slug = $3, content = $4, excerpt = $5, \
                              published = $6, published_at = $7, tags = $8, updated_at = now() \
             WHERE id = $1",
        )
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.slug)
        .bind(&params.content)
        .bind(&params.excerpt)
        .bind(params.published)
        .bind(params.published_at)
        .bind(&params.tags)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        if let Some(category_ids) = params.category_ids.as_deref() {
            Self::replace_post_categories(&mut tx, params.id, category_ids).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        self.post_view_where("id", PostKey::Id(params.id))
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use quire::application::auth::AuthService;
use quire::application::cache::ResponseCache;
use quire::application::categories::CategoryService;
use quire::application::kv::KvStore;
use quire::application::mailer::{EmailMessage, MailError, Mailer};
use quire::application::pagination::{Page, PageRequest};
use quire::application::passwords::{HashCost, PasswordHasher};
use quire::application::posts::PostService;
use quire::application::repos::{
    CategoriesRepo, CreateCategoryParams, CreatePostParams, CreateUserParams, DraftScope,
    HealthRepo, PostListFilter, PostsRepo, RepoError, UpdatePostParams, UpdateProfileParams,
    UsersRepo,
};
use quire::application::tokens::{TokenCodec, TokenTtls};
use quire::config::CorsSettings;
use quire::domain::entities::{
    AuthorSummary, CategoryRecord, PostRecord, PostSearchHit, PostStatistics, PostView,
    UserProfileRecord, UserRecord,
};
use quire::domain::types::{PostOrder, UserRole};
use quire::infra::http::{self, ApiState, RateLimiter, TierLimits};
use quire::infra::kv::MemoryStore;

pub const SECRET: &[u8] = b"integration-secret-integration-secret";
pub const PASSWORD: &str = "correct horse battery";

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    profiles: HashMap<i64, UserProfileRecord>,
    posts: HashMap<Uuid, PostRecord>,
    post_categories: HashMap<Uuid, Vec<Uuid>>,
    categories: Vec<CategoryRecord>,
}

/// Every repository trait over one set of in-process tables.
#[derive(Default)]
pub struct MemoryRepositories {
    tables: Mutex<Tables>,
    database_down: std::sync::atomic::AtomicBool,
}

impl MemoryRepositories {
    pub async fn set_role(&self, user_id: i64, role: UserRole) {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.role = role;
        }
    }

    pub async fn deactivate(&self, user_id: i64) {
        let mut tables = self.tables.lock().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            user.is_active = false;
        }
    }

    pub async fn backdate_post(&self, id: Uuid, days: i64) {
        let mut tables = self.tables.lock().await;
        if let Some(post) = tables.posts.get_mut(&id) {
            post.created_at -= time::Duration::days(days);
        }
    }

    pub async fn post_count(&self) -> usize {
        self.tables.lock().await.posts.len()
    }

    pub fn set_database_down(&self, down: bool) {
        self.database_down
            .store(down, std::sync::atomic::Ordering::SeqCst);
    }

    fn view(tables: &Tables, post: &PostRecord) -> PostView {
        let author = tables
            .users
            .iter()
            .find(|u| u.id == post.author_id)
            .map(|u| AuthorSummary {
                id: u.id,
                username: u.username.clone(),
                full_name: u.full_name.clone(),
                avatar_url: u.avatar_url.clone(),
            })
            .unwrap_or(AuthorSummary {
                id: post.author_id,
                username: String::new(),
                full_name: None,
                avatar_url: None,
            });
        let linked = tables
            .post_categories
            .get(&post.id)
            .cloned()
            .unwrap_or_default();
        let categories = tables
            .categories
            .iter()
            .filter(|c| linked.contains(&c.id))
            .cloned()
            .collect();
        PostView {
            post: post.clone(),
            author,
            categories,
        }
    }

    fn check_categories(tables: &Tables, ids: &[Uuid]) -> Result<(), RepoError> {
        if ids
            .iter()
            .all(|id| tables.categories.iter().any(|c| c.id == *id))
        {
            Ok(())
        } else {
            Err(RepoError::Integrity {
                message: "post_categories_category_id_fkey".to_string(),
            })
        }
    }
}

fn matches_text(post: &PostRecord, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    post.title.to_lowercase().contains(&needle) || post.content.to_lowercase().contains(&needle)
}

#[async_trait]
impl UsersRepo for MemoryRepositories {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.email == params.email) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".to_string(),
            });
        }
        if tables.users.iter().any(|u| u.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "users_username_key".to_string(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let user = UserRecord {
            id: tables.users.len() as i64 + 1,
            email: params.email,
            username: params.username,
            full_name: params.full_name,
            hashed_password: params.hashed_password,
            bio: None,
            avatar_url: None,
            is_active: true,
            is_verified: false,
            is_superuser: false,
            role: params.role,
            token_version: 0,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_profile(&self, user_id: i64) -> Result<Option<UserProfileRecord>, RepoError> {
        Ok(self.tables.lock().await.profiles.get(&user_id).cloned())
    }

    async fn record_login(&self, id: i64, at: OffsetDateTime) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound)?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn update_password(
        &self,
        id: i64,
        hashed_password: &str,
    ) -> Result<UserRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepoError::NotFound)?;
        user.hashed_password = hashed_password.to_string();
        user.token_version += 1;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn update_profile(
        &self,
        params: UpdateProfileParams,
    ) -> Result<(UserRecord, UserProfileRecord), RepoError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == params.user_id)
            .ok_or(RepoError::NotFound)?;
        if let Some(full_name) = params.full_name {
            user.full_name = Some(full_name);
        }
        if let Some(bio) = params.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar_url) = params.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
        let user = user.clone();

        let profile = tables
            .profiles
            .entry(params.user_id)
            .or_insert_with(|| UserProfileRecord {
                user_id: params.user_id,
                ..Default::default()
            });
        if let Some(website) = params.website {
            profile.website = Some(website);
        }
        if let Some(location) = params.location {
            profile.location = Some(location);
        }
        if let Some(company) = params.company {
            profile.company = Some(company);
        }
        Ok((user, profile.clone()))
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn list_posts(
        &self,
        filter: &PostListFilter,
        page: PageRequest,
    ) -> Result<Page<PostView>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&PostRecord> = tables
            .posts
            .values()
            .filter(|p| match filter.drafts {
                _ if p.published => true,
                DraftScope::None => false,
                DraftScope::OwnedBy(owner) => p.author_id == owner,
                DraftScope::All => true,
            })
            .filter(|p| filter.author_id.is_none_or(|id| p.author_id == id))
            .filter(|p| {
                filter.category_id.is_none_or(|id| {
                    tables
                        .post_categories
                        .get(&p.id)
                        .is_some_and(|ids| ids.contains(&id))
                })
            })
            .filter(|p| filter.tag.as_ref().is_none_or(|tag| p.tags.contains(tag)))
            .filter(|p| {
                filter
                    .search
                    .as_ref()
                    .is_none_or(|needle| matches_text(p, needle))
            })
            .collect();

        posts.sort_by(|a, b| {
            let ordering = match filter.order_by {
                PostOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                PostOrder::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                PostOrder::ViewCount => a.view_count.cmp(&b.view_count),
                PostOrder::PublishedAt => a.published_at.cmp(&b.published_at),
            };
            if filter.order_desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let total = posts.len() as u64;
        let items = posts
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size() as usize)
            .map(|p| Self::view(&tables, p))
            .collect();
        Ok(Page::new(items, total, page))
    }

    async fn search_posts(&self, query: &str, limit: u32) -> Result<Vec<PostSearchHit>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .values()
            .filter(|p| p.published && matches_text(p, query))
            .take(limit as usize)
            .map(|p| {
                let view = Self::view(&tables, p);
                PostSearchHit {
                    id: p.id,
                    title: p.title.clone(),
                    excerpt: p.excerpt.clone(),
                    slug: p.slug.clone(),
                    author: view.author,
                    relevance: 1.0,
                }
            })
            .collect())
    }

    async fn popular_posts(
        &self,
        since: OffsetDateTime,
        limit: u32,
    ) -> Result<Vec<PostView>, RepoError> {
        let tables = self.tables.lock().await;
        let mut posts: Vec<&PostRecord> = tables
            .posts
            .values()
            .filter(|p| p.published && p.created_at >= since)
            .collect();
        posts.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        Ok(posts
            .into_iter()
            .take(limit as usize)
            .map(|p| Self::view(&tables, p))
            .collect())
    }

    async fn statistics(&self, author_id: Option<i64>) -> Result<PostStatistics, RepoError> {
        let tables = self.tables.lock().await;
        let views: Vec<i64> = tables
            .posts
            .values()
            .filter(|p| p.published && author_id.is_none_or(|id| p.author_id == id))
            .map(|p| p.view_count)
            .collect();
        let total_views: i64 = views.iter().sum();
        Ok(PostStatistics {
            total_posts: views.len() as i64,
            total_views,
            avg_views: if views.is_empty() {
                0.0
            } else {
                total_views as f64 / views.len() as f64
            },
            max_views: views.iter().copied().max().unwrap_or(0),
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostView>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.posts.get(&id).map(|p| Self::view(&tables, p)))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostView>, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .posts
            .values()
            .find(|p| p.slug == slug)
            .map(|p| Self::view(&tables, p)))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.posts.values().any(|p| p.slug == slug))
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<i64>, RepoError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.posts.get_mut(&id).map(|p| {
            p.view_count += 1;
            p.view_count
        }))
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostView, RepoError> {
        let mut tables = self.tables.lock().await;
        Self::check_categories(&tables, &params.category_ids)?;
        let now = OffsetDateTime::now_utc();
        let post = PostRecord {
            id: Uuid::new_v4(),
            title: params.title,
            slug: params.slug,
            content: params.content,
            excerpt: params.excerpt,
            published: params.published,
            published_at: params.published_at,
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            tags: params.tags,
            author_id: params.author_id,
            created_at: now,
            updated_at: now,
        };
        tables.post_categories.insert(post.id, params.category_ids);
        tables.posts.insert(post.id, post.clone());
        Ok(Self::view(&tables, &post))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostView, RepoError> {
        let mut tables = self.tables.lock().await;
        if let Some(ids) = &params.category_ids {
            Self::check_categories(&tables, ids)?;
        }
        let post = tables.posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        post.title = params.title;
        post.slug = params.slug;
        post.content = params.content;
        post.excerpt = params.excerpt;
        post.published = params.published;
        post.published_at = params.published_at;
        post.tags = params.tags;
        post.updated_at = OffsetDateTime::now_utc();
        let post = post.clone();
        if let Some(ids) = params.category_ids {
            tables.post_categories.insert(post.id, ids);
        }
        Ok(Self::view(&tables, &post))
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.tables.lock().await;
        tables.post_categories.remove(&id);
        tables.posts.remove(&id).map(|_| ()).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl CategoriesRepo for MemoryRepositories {
    async fn list_categories(&self) -> Result<Vec<CategoryRecord>, RepoError> {
        let mut categories = self.tables.lock().await.categories.clone();
        categories.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(categories)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        let tables = self.tables.lock().await;
        Ok(tables.categories.iter().any(|c| c.slug == slug))
    }

    async fn create_category(
        &self,
        params: CreateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let mut tables = self.tables.lock().await;
        if tables.categories.iter().any(|c| c.name == params.name) {
            return Err(RepoError::Duplicate {
                constraint: "categories_name_key".to_string(),
            });
        }
        let category = CategoryRecord {
            id: Uuid::new_v4(),
            name: params.name,
            slug: params.slug,
            description: params.description,
            is_featured: params.is_featured,
            display_order: params.display_order,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.categories.push(category.clone());
        Ok(category)
    }
}

#[async_trait]
impl HealthRepo for MemoryRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        if self.database_down.load(std::sync::atomic::Ordering::SeqCst) {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TestOptions {
    pub rate_limit: bool,
    pub limits: TierLimits,
    pub cache: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            rate_limit: false,
            limits: TierLimits {
                auth: 5,
                strict: 10,
                api: 60,
            },
            cache: true,
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub repos: Arc<MemoryRepositories>,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let repos = Arc::new(MemoryRepositories::default());
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let kv: Arc<dyn KvStore> = store.clone();

        let tokens = TokenCodec::new(
            SECRET,
            TokenTtls {
                access: time::Duration::minutes(30),
                refresh: time::Duration::days(30),
                reset: time::Duration::hours(1),
            },
        );
        let hasher = PasswordHasher::new(HashCost {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        })
        .expect("cheap hash cost");
        let cache = ResponseCache::new(Arc::clone(&kv), Duration::from_secs(300), options.cache);

        let state = ApiState {
            auth: Arc::new(AuthService::new(
                repos.clone(),
                Arc::clone(&kv),
                tokens,
                hasher,
                mailer.clone(),
                "https://blog.example.com/reset",
            )),
            posts: Arc::new(PostService::new(repos.clone(), cache.clone())),
            categories: Arc::new(CategoryService::new(repos.clone(), cache)),
            rate_limiter: RateLimiter::new(
                Arc::clone(&kv),
                Duration::from_secs(60),
                options.limits,
                options.rate_limit,
            ),
            trust_forwarded_for: true,
            database: repos.clone(),
            kv,
        };
        let router = http::build_router(
            state,
            &CorsSettings {
                allowed_origins: vec!["https://blog.example.com".to_string()],
            },
        );

        Self {
            router,
            repos,
            store,
            mailer,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let response = self.send(request).await;
        let status = response.status();
        (status, read_json(response).await)
    }

    pub async fn register(&self, email: &str, username: &str) -> Value {
        let (status, body) = self
            .json(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(serde_json::json!({
                    "email": email,
                    "username": username,
                    "password": PASSWORD,
                    "confirm_password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body
    }

    pub async fn login_raw(&self, email: &str, password: &str) -> Response {
        let form = format!(
            "username={}&password={}",
            email.replace('@', "%40"),
            password.replace(' ', "+")
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/auth/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .expect("request");
        self.send(request).await
    }

    /// Access and refresh tokens for a successful login.
    pub async fn login(&self, email: &str) -> (String, String) {
        let response = self.login_raw(email, PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        (
            body["access_token"].as_str().expect("access").to_string(),
            body["refresh_token"].as_str().expect("refresh").to_string(),
        )
    }

    /// Register and log in, returning the user id and access token.
    pub async fn signed_in(&self, email: &str, username: &str) -> (i64, String) {
        let user = self.register(email, username).await;
        let (access, _) = self.login(email).await;
        (user["id"].as_i64().expect("id"), access)
    }
}

pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    }
}

pub async fn read_as<T: DeserializeOwned>(response: Response) -> T {
    serde_json::from_value(read_json(response).await).expect("typed body")
}

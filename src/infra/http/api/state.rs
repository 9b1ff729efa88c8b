use std::sync::Arc;

use crate::application::auth::AuthService;
use crate::application::categories::CategoryService;
use crate::application::kv::KvStore;
use crate::application::posts::PostService;
use crate::application::repos::HealthRepo;

use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub posts: Arc<PostService>,
    pub categories: Arc<CategoryService>,
    pub rate_limiter: RateLimiter,
    /// Honour `X-Forwarded-For` when keying rate limits.
    pub trust_forwarded_for: bool,
    pub database: Arc<dyn HealthRepo>,
    pub kv: Arc<dyn KvStore>,
}

//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::UserRole;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_superuser: bool,
    pub role: UserRole,
    pub token_version: i32,
    pub last_login: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    /// Moderators, admins and superusers may act on content they do not own.
    pub fn can_moderate(&self) -> bool {
        self.is_superuser || matches!(self.role, UserRole::Moderator | UserRole::Admin)
    }

    /// Admins and superusers satisfy every role requirement.
    pub fn has_role(&self, required: UserRole) -> bool {
        self.is_superuser || self.role == required || self.role == UserRole::Admin
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserProfileRecord {
    pub user_id: i64,
    pub website: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub is_featured: bool,
    pub display_order: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub published: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub published_at: Option<OffsetDateTime>,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub tags: Vec<String>,
    pub author_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A post joined with its author and categories, as every read returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostView {
    pub post: PostRecord,
    pub author: AuthorSummary,
    pub categories: Vec<CategoryRecord>,
}

impl PostView {
    /// Whether `viewer` may read this post.
    pub fn visible_to(&self, viewer: Option<&UserRecord>) -> bool {
        if self.post.published {
            return true;
        }
        viewer.is_some_and(|user| user.id == self.post.author_id || user.can_moderate())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSearchHit {
    pub id: Uuid,
    pub title: String,
    pub excerpt: Option<String>,
    pub slug: String,
    pub author: AuthorSummary,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostStatistics {
    pub total_posts: i64,
    pub total_views: i64,
    pub avg_views: f64,
    pub max_views: i64,
}

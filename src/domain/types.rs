//! Shared domain enumerations aligned with persisted database enums.

use serde::{Deserialize, Serialize};

pub use quire_api_types::UserRole;

/// Purpose carried in the `type` claim of every issued token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Reset => "reset",
        }
    }
}

/// Columns a post listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostOrder {
    #[default]
    CreatedAt,
    UpdatedAt,
    ViewCount,
    PublishedAt,
}

impl PostOrder {
    pub fn column(self) -> &'static str {
        match self {
            PostOrder::CreatedAt => "created_at",
            PostOrder::UpdatedAt => "updated_at",
            PostOrder::ViewCount => "view_count",
            PostOrder::PublishedAt => "published_at",
        }
    }
}

//! Conversions from stored records into wire responses.

use quire_api_types::{
    AuthorSummary, CategoryResponse, PageResponse, PostResponse, PostSearchResult,
    PostStatisticsResponse, ProfileResponse, TokenResponse, UserResponse, UserWithProfile,
};

use crate::application::auth::TokenPair;
use crate::application::pagination::Page;
use crate::domain::entities::{
    self, CategoryRecord, PostSearchHit, PostStatistics, PostView, UserProfileRecord, UserRecord,
};

pub fn user_response(user: UserRecord) -> UserResponse {
    UserResponse {
        id: user.id,
        email: user.email,
        username: user.username,
        full_name: user.full_name,
        bio: user.bio,
        avatar_url: user.avatar_url,
        is_active: user.is_active,
        is_verified: user.is_verified,
        is_superuser: user.is_superuser,
        role: user.role,
        last_login: user.last_login,
        created_at: user.created_at,
    }
}

pub fn profile_response(profile: UserProfileRecord) -> ProfileResponse {
    ProfileResponse {
        website: profile.website,
        location: profile.location,
        company: profile.company,
    }
}

pub fn user_with_profile(user: UserRecord, profile: Option<UserProfileRecord>) -> UserWithProfile {
    UserWithProfile {
        user: user_response(user),
        profile: profile.map(profile_response),
    }
}

pub fn token_response(pair: TokenPair) -> TokenResponse {
    TokenResponse {
        expires_at: Some(pair.access.claims.expires_at()),
        access_token: pair.access.token,
        refresh_token: pair.refresh.token,
        token_type: "bearer".to_string(),
        expires_in: pair.expires_in,
    }
}

fn author_summary(author: entities::AuthorSummary) -> AuthorSummary {
    AuthorSummary {
        id: author.id,
        username: author.username,
        full_name: author.full_name,
        avatar_url: author.avatar_url,
    }
}

pub fn category_response(category: CategoryRecord) -> CategoryResponse {
    CategoryResponse {
        id: category.id,
        name: category.name,
        slug: category.slug,
        description: category.description,
        is_featured: category.is_featured,
        display_order: category.display_order,
        created_at: category.created_at,
    }
}

pub fn post_response(view: PostView) -> PostResponse {
    let PostView {
        post,
        author,
        categories,
    } = view;
    PostResponse {
        id: post.id,
        title: post.title,
        slug: post.slug,
        content: post.content,
        excerpt: post.excerpt,
        published: post.published,
        published_at: post.published_at,
        view_count: post.view_count,
        like_count: post.like_count,
        comment_count: post.comment_count,
        tags: post.tags,
        author: author_summary(author),
        categories: categories.into_iter().map(category_response).collect(),
        created_at: post.created_at,
        updated_at: post.updated_at,
    }
}

pub fn search_result(hit: PostSearchHit) -> PostSearchResult {
    PostSearchResult {
        id: hit.id,
        title: hit.title,
        excerpt: hit.excerpt,
        slug: hit.slug,
        author: author_summary(hit.author),
        relevance_score: hit.relevance,
    }
}

pub fn statistics_response(stats: PostStatistics) -> PostStatisticsResponse {
    PostStatisticsResponse {
        total_posts: stats.total_posts,
        total_views: stats.total_views,
        avg_views: stats.avg_views,
        max_views: stats.max_views,
    }
}

pub fn page_response<T, U>(page: Page<T>, f: impl FnMut(T) -> U) -> PageResponse<U> {
    let page = page.map(f);
    PageResponse {
        items: page.items,
        total: page.total,
        page: page.page,
        size: page.size,
        pages: page.pages,
    }
}

use std::collections::HashSet;

use sqlx::PgPool;

use quire::application::pagination::PageRequest;
use quire::application::repos::{
    CategoriesRepo, CreateCategoryParams, CreatePostParams, CreateUserParams, PostListFilter,
    PostsRepo, RepoError, UsersRepo,
};
use quire::domain::types::UserRole;
use quire::infra::db::PostgresRepositories;

async fn index_names(pool: &PgPool, table: &str) -> HashSet<String> {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' AND tablename = $1",
    )
    .bind(table)
    .fetch_all(pool)
    .await
    .expect("fetch indexes");
    rows.into_iter().collect()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
async fn post_indexes_exist(pool: PgPool) {
    let indexes = index_names(&pool, "posts").await;
    for name in [
        "posts_published_idx",
        "posts_author_idx",
        "posts_view_count_idx",
        "posts_search_idx",
        "posts_tags_idx",
    ] {
        assert!(indexes.contains(name), "missing {name}");
    }

    let indexes = index_names(&pool, "post_categories").await;
    assert!(indexes.contains("post_categories_category_idx"));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
async fn repositories_round_trip_through_postgres(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);

    let user = repos
        .create_user(CreateUserParams {
            email: "ada@example.com".to_string(),
            username: "ada".to_string(),
            full_name: None,
            hashed_password: "hash".to_string(),
            role: UserRole::User,
        })
        .await
        .expect("create user");

    let duplicate = repos
        .create_user(CreateUserParams {
            email: "ada@example.com".to_string(),
            username: "other".to_string(),
            full_name: None,
            hashed_password: "hash".to_string(),
            role: UserRole::User,
        })
        .await;
    assert!(matches!(duplicate, Err(RepoError::Duplicate { .. })));

    let category = repos
        .create_category(CreateCategoryParams {
            name: "Rust".to_string(),
            slug: "rust".to_string(),
            description: None,
            is_featured: false,
            display_order: 0,
        })
        .await
        .expect("create category");

    let view = repos
        .create_post(CreatePostParams {
            title: "Ownership in practice".to_string(),
            slug: "ownership-in-practice".to_string(),
            content: "Borrowing rules keep aliasing honest.".to_string(),
            excerpt: None,
            published: true,
            published_at: Some(time::OffsetDateTime::now_utc()),
            tags: vec!["rust".to_string()],
            author_id: user.id,
            category_ids: vec![category.id],
        })
        .await
        .expect("create post");
    assert_eq!(view.author.username, "ada");
    assert_eq!(view.categories.len(), 1);

    assert!(
        CategoriesRepo::slug_exists(&repos, "rust")
            .await
            .expect("slug lookup")
    );
    assert!(
        PostsRepo::slug_exists(&repos, "ownership-in-practice")
            .await
            .expect("slug lookup")
    );

    let views = repos
        .increment_views(view.post.id)
        .await
        .expect("increment");
    assert_eq!(views, Some(1));

    let page = repos
        .list_posts(&PostListFilter::default(), PageRequest::default())
        .await
        .expect("list");
    assert_eq!(page.total, 1);

    for wildcard in ["%", "_"] {
        let filter = PostListFilter {
            search: Some(wildcard.to_string()),
            ..PostListFilter::default()
        };
        let page = repos
            .list_posts(&filter, PageRequest::default())
            .await
            .expect("list");
        assert_eq!(page.total, 0, "`{wildcard}` matched literally");
    }

    let hits = repos.search_posts("ownership", 10).await.expect("search");
    assert_eq!(hits.len(), 1);

    let updated = repos
        .update_password(user.id, "new-hash")
        .await
        .expect("update password");
    assert_eq!(updated.token_version, user.token_version + 1);
}

pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rate_limit;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

/// Routes served under `/api/v1`, rate limited per tier.
pub fn build_api_router(state: ApiState) -> Router {
    let rate_state = state.clone();

    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/logout", post(handlers::logout))
        .route("/auth/me", get(handlers::me).patch(handlers::update_me))
        .route("/auth/refresh", post(handlers::refresh))
        .route("/auth/verify", post(handlers::verify))
        .route(
            "/auth/password/reset-request",
            post(handlers::request_password_reset),
        )
        .route("/auth/password/reset", post(handlers::reset_password))
        .route(
            "/posts",
            get(handlers::list_posts).post(handlers::create_post),
        )
        .route("/posts/search", get(handlers::search_posts))
        .route("/posts/popular", get(handlers::popular_posts))
        .route("/posts/stats", get(handlers::post_statistics))
        .route("/posts/slug/{slug}", get(handlers::get_post_by_slug))
        .route(
            "/posts/{id}",
            get(handlers::get_post)
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route(
            "/categories",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
}

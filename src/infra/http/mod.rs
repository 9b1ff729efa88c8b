pub mod api;
mod middleware;

pub use api::rate_limit::{RateLimiter, TierLimits};
pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use axum::{Router, http::HeaderValue, middleware::from_fn, routing::get};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::CorsSettings;

use self::middleware::{log_responses, set_request_context};

/// The complete application: `/health` plus the versioned API.
pub fn build_router(state: ApiState, cors: &CorsSettings) -> Router {
    Router::new()
        .route("/health", get(api::handlers::health))
        .with_state(state.clone())
        .nest("/api/v1", build_api_router(state))
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
        .layer(cors_layer(cors))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(cors: &CorsSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    target = "quire::http::cors",
                    origin = %origin,
                    error = %err,
                    "ignoring unparsable CORS origin"
                );
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

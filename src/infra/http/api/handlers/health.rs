use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quire_api_types::HealthResponse;
use tracing::warn;

use crate::application::error::ErrorReport;
use crate::infra::http::api::state::ApiState;

/// Database and key-value store reachability. Degraded dependencies yield 503.
pub async fn health(State(state): State<ApiState>) -> Response {
    let database = match state.database.ping().await {
        Ok(()) => "healthy",
        Err(err) => {
            warn!(target = "quire::health", error = %err, "database health check failed");
            "unhealthy"
        }
    };
    let cache = match state.kv.ping().await {
        Ok(()) => "healthy",
        Err(err) => {
            warn!(target = "quire::health", error = %err, "key-value store health check failed");
            "unhealthy"
        }
    };

    let healthy = database == "healthy" && cache == "healthy";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        database: database.to_string(),
        cache: cache.to_string(),
    };
    let mut response = (status, Json(body)).into_response();
    if !healthy {
        ErrorReport::from_message(
            "infra::http::health",
            status,
            format!("database={database} cache={cache}"),
        )
        .attach(&mut response);
    }
    response
}

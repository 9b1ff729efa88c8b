use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::rate_limit::{Decision, RateTier};
use super::state::ApiState;

const UNKNOWN_CLIENT: &str = "unknown";

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let tier = RateTier::for_path(&path);
    let client = client_ip(&request, state.trust_forwarded_for);

    match state.rate_limiter.check(tier, &client, &path).await {
        Decision::Limited { retry_after } => ApiError::rate_limited(retry_after),
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            if state.rate_limiter.is_enabled() {
                let headers = response.headers_mut();
                headers.insert(
                    "x-ratelimit-limit",
                    HeaderValue::from(state.rate_limiter.limit(tier)),
                );
                headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
            }
            response
        }
    }
}

pub(crate) fn client_ip(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for && let Some(ip) = forwarded_for(request.headers()) {
        return ip;
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

pub(crate) fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let mut parts = raw.splitn(2, ' ');
    let scheme = parts.next()?;
    let token = parts.next()?.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token.to_string())
    } else {
        None
    }
}

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::warn;

use crate::application::kv::KvStore;

pub(crate) const METRIC_RATE_LIMIT_REJECTED_TOTAL: &str = "quire_rate_limit_rejected_total";

/// Request classes with their own per-window allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateTier {
    /// Login and registration.
    Auth,
    /// Password reset endpoints.
    Strict,
    Api,
}

impl RateTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RateTier::Auth => "auth",
            RateTier::Strict => "strict",
            RateTier::Api => "api",
        }
    }

    /// Classify a request path, with or without the `/api/v1` prefix.
    pub fn for_path(path: &str) -> Self {
        let path = path.strip_prefix("/api/v1").unwrap_or(path);
        match path {
            "/auth/login" | "/auth/register" => RateTier::Auth,
            p if p.starts_with("/auth/password/") => RateTier::Strict,
            _ => RateTier::Api,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub auth: u32,
    pub strict: u32,
    pub api: u32,
}

impl TierLimits {
    fn limit(&self, tier: RateTier) -> u32 {
        match tier {
            RateTier::Auth => self.auth,
            RateTier::Strict => self.strict,
            RateTier::Api => self.api,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

/// Fixed-window limiter whose counters live in the shared key-value store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    window: Duration,
    limits: TierLimits,
    enabled: bool,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, window: Duration, limits: TierLimits, enabled: bool) -> Self {
        Self {
            store,
            window,
            limits,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit(&self, tier: RateTier) -> u32 {
        self.limits.limit(tier)
    }

    pub async fn check(&self, tier: RateTier, client: &str, path: &str) -> Decision {
        let limit = self.limits.limit(tier);
        if !self.enabled {
            return Decision::Allowed { remaining: limit };
        }

        let key = format!("rate_limit:{}:{client}:{path}", tier.as_str());
        match self.store.hit(&key, self.window).await {
            Ok(hit) if hit.count > u64::from(limit) => {
                counter!(METRIC_RATE_LIMIT_REJECTED_TOTAL, "tier" => tier.as_str()).increment(1);
                Decision::Limited {
                    retry_after: hit.resets_in.as_secs().max(1),
                }
            }
            Ok(hit) => Decision::Allowed {
                remaining: limit.saturating_sub(u32::try_from(hit.count).unwrap_or(u32::MAX)),
            },
            Err(err) => {
                warn!(
                    target = "quire::http::rate_limit",
                    key = %key,
                    error = %err,
                    "rate limit store unavailable; allowing request"
                );
                Decision::Allowed { remaining: limit }
            }
        }
    }
}

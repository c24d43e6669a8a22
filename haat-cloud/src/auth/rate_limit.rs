//! Per-IP rate limiting for the login and registration routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::{AppError, ErrorCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::state::AppState;

/// Fixed-window limit for one route
#[derive(Debug, Clone, Copy)]
pub struct RateRule {
    pub route: &'static str,
    pub max_requests: u32,
    pub window: Duration,
}

pub const LOGIN_RULE: RateRule = RateRule {
    route: "login",
    max_requests: 5,
    window: Duration::from_secs(60),
};

pub const REGISTER_RULE: RateRule = RateRule {
    route: "register",
    max_requests: 3,
    window: Duration::from_secs(60),
};

/// Entries idle longer than this are dropped by [`RateLimiter::cleanup`]
const IDLE_CUTOFF: Duration = Duration::from_secs(300);

struct IpWindow {
    count: u32,
    started: Instant,
}

#[derive(Clone, Default)]
pub struct RateLimiter {
    /// route name -> (IP -> window)
    inner: Arc<Mutex<HashMap<&'static str, HashMap<String, IpWindow>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request; `false` once the window is exhausted.
    pub async fn check(&self, rule: RateRule, ip: &str) -> bool {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        let window = map
            .entry(rule.route)
            .or_default()
            .entry(ip.to_owned())
            .or_insert(IpWindow {
                count: 0,
                started: now,
            });

        if now.duration_since(window.started) >= rule.window {
            window.count = 0;
            window.started = now;
        }

        window.count += 1;
        window.count <= rule.max_requests
    }

    pub async fn cleanup(&self) {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        for route_map in map.values_mut() {
            route_map.retain(|_, w| now.duration_since(w.started) < IDLE_CUTOFF);
        }
        map.retain(|_, route_map| !route_map.is_empty());
    }

    #[cfg(test)]
    async fn tracked_ips(&self) -> usize {
        self.inner.lock().await.values().map(|m| m.len()).sum()
    }
}

/// Client IP: first X-Forwarded-For entry, then the peer address.
fn client_ip(request: &Request) -> String {
    if let Some(first) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return first.to_owned();
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

async fn enforce(state: &AppState, rule: RateRule, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    if !state.rate_limiter.check(rule, &ip).await {
        tracing::warn!(route = rule.route, ip = %ip, "Rate limit exceeded");
        return AppError::new(ErrorCode::RateLimited).into_response();
    }
    next.run(request).await
}

pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state, LOGIN_RULE, request, next).await
}

pub async fn register_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    enforce(&state, REGISTER_RULE, request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allows_up_to_limit() {
        let limiter = RateLimiter::new();
        for _ in 0..REGISTER_RULE.max_requests {
            assert!(limiter.check(REGISTER_RULE, "10.0.0.1").await);
        }
        assert!(!limiter.check(REGISTER_RULE, "10.0.0.1").await);
    }

    #[tokio::test]
    async fn test_ips_and_routes_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..REGISTER_RULE.max_requests {
            limiter.check(REGISTER_RULE, "10.0.0.1").await;
        }
        assert!(!limiter.check(REGISTER_RULE, "10.0.0.1").await);
        assert!(limiter.check(REGISTER_RULE, "10.0.0.2").await);
        assert!(limiter.check(LOGIN_RULE, "10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets() {
        let limiter = RateLimiter::new();
        let rule = RateRule {
            route: "test",
            max_requests: 1,
            window: Duration::from_secs(10),
        };
        assert!(limiter.check(rule, "ip").await);
        assert!(!limiter.check(rule, "ip").await);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(limiter.check(rule, "ip").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_drops_idle_entries() {
        let limiter = RateLimiter::new();
        limiter.check(LOGIN_RULE, "10.0.0.1").await;
        assert_eq!(limiter.tracked_ips().await, 1);

        tokio::time::advance(IDLE_CUTOFF + Duration::from_secs(1)).await;
        limiter.cleanup().await;
        assert_eq!(limiter.tracked_ips().await, 0);
    }
}

//! Per-client request rate limiting.
//!
//! Fixed one-minute windows keyed by client IP. A limit of zero disables the limiter.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited,
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: DashMap<IpAddr, Window>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: DashMap::new(),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Count one request from `client`.
    pub fn check(&self, client: IpAddr) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: IpAddr, now: Instant) -> Decision {
        if !self.is_enabled() {
            return Decision::Allowed { remaining: u32::MAX };
        }

        let mut entry = self.clients.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            return Decision::Limited;
        }
        entry.count += 1;
        Decision::Allowed {
            remaining: self.limit - entry.count,
        }
    }

    /// Drop windows that have fully elapsed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.clients
            .retain(|_, w| now.duration_since(w.started) < self.window);
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

/// Axum middleware applying the limiter to every request.
pub async fn rate_limit_layer(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    match limiter.check(client) {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.limit()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
        Decision::Limited => {
            tracing::warn!(client = %client, "rate limit exceeded");
            let body = json!({
                "status": 429,
                "message": "Too many requests, please try again later.",
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.limit()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(0u32));
            response
        }
    }
}

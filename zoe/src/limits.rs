//! Per-IP request rate limiting.
//!
//! Three fixed-window limiters protect the API:
//!
//! - `global` counts every request;
//! - `auth` guards login and only counts attempts that fail, so a user who logs in correctly
//!   is never locked out by their own successes;
//! - `admin` guards the admin-only user management routes.
//!
//! Each limiter keeps one window per client IP. A window opens on the first request and
//! closes `window` later; once `max_requests` hits land inside it, further requests get
//! HTTP 429 with the seconds left until it closes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tracing::debug;

use crate::AppState;
use crate::api::extract::client_ip;
use crate::config::{LimitsConfig, RateLimitConfig};
use crate::errors::{Error, ErrorCode, Result};

/// Windows are pruned once a limiter tracks more clients than this.
const PRUNE_THRESHOLD: usize = 10_000;

/// Container for all resource limiters. `None` means the tier is disabled.
#[derive(Debug, Default, Clone)]
pub struct Limiters {
    pub global: Option<Arc<RateLimiter>>,
    pub auth: Option<Arc<RateLimiter>>,
    pub admin: Option<Arc<RateLimiter>>,
}

impl Limiters {
    /// Creates all limiters from configuration.
    pub fn new(config: &LimitsConfig) -> Self {
        Self {
            global: RateLimiter::new(
                &config.global,
                ErrorCode::RateLimitExceeded,
                "Too many requests from this IP, please try again later",
            )
            .map(Arc::new),
            auth: RateLimiter::new(
                &config.auth,
                ErrorCode::AuthRateLimitExceeded,
                "Too many failed login attempts, please try again later",
            )
            .map(Arc::new),
            admin: RateLimiter::new(
                &config.admin,
                ErrorCode::AdminRateLimitExceeded,
                "Too many admin requests, please try again later",
            )
            .map(Arc::new),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    opened: Instant,
    hits: u32,
}

/// A fixed-window counter keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    code: ErrorCode,
    message: &'static str,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    /// Creates a limiter from configuration, or `None` when it is disabled.
    pub fn new(config: &RateLimitConfig, code: ErrorCode, message: &'static str) -> Option<Self> {
        if !config.enabled {
            return None;
        }

        Some(Self {
            window: config.window,
            max_requests: config.max_requests,
            code,
            message,
            windows: DashMap::new(),
        })
    }

    /// Count a request and reject it if the client's window is already full.
    pub fn hit(&self, key: &str) -> Result<()> {
        self.hit_at(key, Instant::now())
    }

    /// Reject if the client's window is full, without counting anything.
    pub fn check(&self, key: &str) -> Result<()> {
        self.check_at(key, Instant::now())
    }

    /// Count a request unconditionally.
    pub fn record(&self, key: &str) {
        self.record_at(key, Instant::now());
    }

    fn hit_at(&self, key: &str, now: Instant) -> Result<()> {
        self.prune_if_large(now);

        let mut entry = self.windows.entry(key.to_string()).or_insert(Window { opened: now, hits: 0 });
        let window = entry.value_mut();
        if now.duration_since(window.opened) >= self.window {
            *window = Window { opened: now, hits: 0 };
        }
        if window.hits >= self.max_requests {
            return Err(self.rejection(window, now));
        }
        window.hits += 1;
        Ok(())
    }

    fn check_at(&self, key: &str, now: Instant) -> Result<()> {
        match self.windows.get(key) {
            Some(window) if now.duration_since(window.opened) < self.window && window.hits >= self.max_requests => {
                Err(self.rejection(&window, now))
            }
            _ => Ok(()),
        }
    }

    fn record_at(&self, key: &str, now: Instant) {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window { opened: now, hits: 0 });
        let window = entry.value_mut();
        if now.duration_since(window.opened) >= self.window {
            *window = Window { opened: now, hits: 0 };
        }
        window.hits = window.hits.saturating_add(1);
    }

    fn rejection(&self, window: &Window, now: Instant) -> Error {
        let remaining = self.window.saturating_sub(now.duration_since(window.opened));
        // Round up so clients never retry a moment too early
        let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Error::TooManyRequests {
            message: self.message.to_string(),
            code: self.code,
            retry_after_secs,
        }
    }

    fn prune_if_large(&self, now: Instant) {
        if self.windows.len() > PRUNE_THRESHOLD {
            self.windows.retain(|_, w| now.duration_since(w.opened) < self.window);
            debug!(remaining = self.windows.len(), "Pruned expired rate limit windows");
        }
    }
}

fn request_ip(request: &Request) -> String {
    client_ip(request.headers(), request.extensions())
}

/// Middleware applying the global limiter to every request.
pub async fn global_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    if let Some(limiter) = &state.limiters.global {
        limiter.hit(&request_ip(&request))?;
    }
    Ok(next.run(request).await)
}

/// Middleware for login: blocked clients are rejected up front, and only error responses
/// count against the window.
pub async fn auth_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    let Some(limiter) = &state.limiters.auth else {
        return Ok(next.run(request).await);
    };

    let ip = request_ip(&request);
    limiter.check(&ip)?;
    let response = next.run(request).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        limiter.record(&ip);
    }
    Ok(response)
}

/// Middleware applying the admin limiter.
pub async fn admin_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    if let Some(limiter) = &state.limiters.admin {
        limiter.hit(&request_ip(&request))?;
    }
    Ok(next.run(request).await)
}

//! Fixed-window rate limiting for mutating requests, keyed by actor.

use super::actor::actor_from_headers;
use crate::error::AppError;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Shared keyed store of request windows.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Count one request for `key`; false once the window is exhausted.
    pub async fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().await;
        let entry = windows.entry(key.to_string()).or_insert(Window {
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
            return false;
        }
        entry.count += 1;
        true
    }

    /// Drop windows that have expired. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) < self.window);
        before - windows.len()
    }
}

/// Middleware: throttles non-GET requests that carry an actor. Gateway
/// webhooks carry none and pass through.
pub async fn limit_mutations(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() == Method::GET {
        return Ok(next.run(request).await);
    }
    let Some(actor) = actor_from_headers(request.headers())? else {
        return Ok(next.run(request).await);
    };

    let key = format!("{}:{}", actor.role, actor.id);
    if !limiter.check(&key).await {
        warn!("Rate limit exceeded for {}", key);
        return Err(AppError::RateLimited);
    }
    Ok(next.run(request).await)
}

/// Periodically evict expired windows.
pub fn spawn_purge_task(limiter: RateLimiter) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window());
        loop {
            interval.tick().await;
            let removed = limiter.purge_expired().await;
            if removed > 0 {
                debug!("Purged {} rate limit windows", removed);
            }
        }
    })
}

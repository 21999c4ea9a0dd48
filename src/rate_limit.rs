use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;

use crate::error::ServerError;
use crate::router::AppState;

/// Per-client fixed-window request counter.
#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    reset_at: Instant,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    /// Rejected, with the whole seconds until the window rolls over
    /// (rounded up, at most the window length).
    Limited { retry_secs: u64 },
}

/// Simple in-memory per-IP fixed-window rate limiter.
///
/// Counters reset at window boundaries rather than sliding, so a client can
/// burst a full window's quota right after each rollover. That artifact is
/// part of the contract; callers wanting smoother admission need a
/// different scheme.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<HashMap<IpAddr, ClientWindow>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub async fn check(&self, ip: IpAddr) -> Decision {
        self.check_at(ip, Instant::now()).await
    }

    /// The check-reset-increment sequence runs as one critical section so
    /// concurrent requests from one address never undercount.
    async fn check_at(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut state = self.state.lock().await;
        let window = self.window;

        match state.get_mut(&ip) {
            None => {
                state.insert(
                    ip,
                    ClientWindow {
                        count: 1,
                        reset_at: now + window,
                    },
                );
                Decision::Allowed
            }
            Some(w) if now > w.reset_at => {
                w.count = 1;
                w.reset_at = now + window;
                Decision::Allowed
            }
            Some(w) if w.count < self.max_requests => {
                w.count += 1;
                Decision::Allowed
            }
            Some(w) => Decision::Limited {
                retry_secs: secs_until(w.reset_at, now),
            },
        }
    }

    /// Drop windows whose reset instant has passed, keeping the map bounded
    /// by currently active clients.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let before = state.len();
        state.retain(|_, w| w.reset_at > now);
        let dropped = before - state.len();
        if dropped > 0 {
            tracing::debug!(dropped, remaining = state.len(), "swept expired windows");
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn secs_until(reset_at: Instant, now: Instant) -> u64 {
    let remaining = reset_at.saturating_duration_since(now);
    (remaining.as_millis() as u64).div_ceil(1000)
}

/// Router-wide admission middleware. Requests whose client address cannot
/// be determined are admitted (fail-open): the filter must never block
/// traffic because of its own problems.
pub async fn admit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(ip) = client_addr(&request) else {
        tracing::warn!("no client address on request, admitting without rate limit");
        return next.run(request).await;
    };

    match state.limiter.check(ip).await {
        Decision::Allowed => next.run(request).await,
        Decision::Limited { retry_secs } => {
            tracing::info!(client = %ip, retry_secs, "rate limit exceeded");
            ServerError::RateLimited { retry_secs }.into_response()
        }
    }
}

/// Client address: first entry of `X-Forwarded-For` when parseable, else
/// the connection peer.
fn client_addr(request: &Request) -> Option<IpAddr> {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}

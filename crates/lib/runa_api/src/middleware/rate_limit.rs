//! Per-route, per-client request budgets.

use std::time::Duration;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::extract::client_addr;

/// Budget for one route group: `burst` requests, one regained per
/// `interval`.
#[derive(Debug, Clone, Copy)]
pub struct RouteLimit {
    pub id: &'static str,
    pub interval: Duration,
    pub burst: u32,
}

impl RouteLimit {
    pub const fn new(id: &'static str, interval: Duration, burst: u32) -> Self {
        Self {
            id,
            interval,
            burst,
        }
    }
}

/// Axum middleware: rejects with `429` once the client's budget for the route
/// is spent. Every request costs one token.
pub async fn limit_route(
    State((state, limit)): State<(AppState, RouteLimit)>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = client_addr(request.headers(), request.extensions());
    let limiter = state.limiter.get_limiter(
        &format!("{}:{client}", limit.id),
        limit.interval,
        limit.burst,
    );
    if !limiter.try_acquire() {
        debug!(route = limit.id, client = %client, "route rate limited");
        return Err(AppError::RateLimited {
            retry_after_secs: limiter.retry_after().as_secs(),
        });
    }
    Ok(next.run(request).await)
}

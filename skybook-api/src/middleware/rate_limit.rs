use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use skybook_store::redis_repo::rate_limit_key;
use std::net::SocketAddr;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Per-IP fixed window limit kept in Redis. Fails open when Redis is
/// missing or unreachable.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    let (Some(redis), Some(ConnectInfo(addr))) = (
        state.redis.as_ref(),
        req.extensions().get::<ConnectInfo<SocketAddr>>().copied(),
    ) else {
        return Ok(next.run(req).await);
    };

    let key = rate_limit_key(&addr.ip().to_string(), Utc::now().timestamp() / 60);
    match redis.check_rate_limit(&key, state.rate_limit_per_minute, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err(AppError::RateLimited("Rate limit exceeded".to_string())),
        Err(e) => {
            warn!("Rate limiter unavailable, letting request through: {}", e);
            Ok(next.run(req).await)
        }
    }
}

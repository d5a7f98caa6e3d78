use axum::{
    extract::{Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use skybook_core::{Policy, RequestContext, Role};
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    /// `ADMIN`, `STAFF` or `CUSTOMER`
    pub role: String,
    pub exp: usize,
}

async fn authenticate(state: &AppState, parts: &mut Parts) -> Result<RequestContext, AppError> {
    let TypedHeader(Authorization(bearer)) = parts
        .extract::<TypedHeader<Authorization<Bearer>>>()
        .await
        .map_err(|_| AppError::AuthenticationError("Missing bearer token".to_string()))?;

    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::AuthenticationError(format!("Invalid token: {}", e)))?;

    let role: Role = token_data
        .claims
        .role
        .parse()
        .map_err(|_| AppError::AuthorizationError(format!("Unknown role {}", token_data.claims.role)))?;

    Ok(RequestContext::new(token_data.claims.sub, role, Utc::now()))
}

/// Decode the bearer token, check `policy`, and hand the caller's
/// `RequestContext` to the handler as an extension
async fn enforce(policy: Policy, state: AppState, req: Request, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();
    let ctx = authenticate(&state, &mut parts).await?;

    if !policy.allows(ctx.role) {
        warn!("{} ({}) denied by {:?} on {}", ctx.user_id, ctx.role, policy, parts.uri.path());
        return Err(AppError::AuthorizationError(format!(
            "Role {} may not call this endpoint",
            ctx.role
        )));
    }

    parts.extensions.insert(ctx);
    Ok(next.run(Request::from_parts(parts, body)).await)
}

pub async fn admin_only(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    enforce(Policy::AdminOnly, state, req, next).await
}

pub async fn customer_or_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(Policy::CustomerOrAdmin, state, req, next).await
}

pub async fn admin_or_staff(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, AppError> {
    enforce(Policy::AdminOrStaff, state, req, next).await
}

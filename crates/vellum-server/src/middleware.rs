use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use uuid::Uuid;

use vellum_types::IdentityId;

/// Header set by the upstream authenticator.
pub const IDENTITY_HEADER: &str = "x-vellum-identity";

/// The authenticated identity making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller(pub IdentityId);

/// Take the caller's identity from the authenticator header.
pub async fn require_identity(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let id = req
        .headers()
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Caller(id));
    Ok(next.run(req).await)
}

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Axum middleware enforcing bearer-token authentication.
///
/// Requests must carry exactly `Authorization: Bearer <token>`; anything else
/// (missing header, wrong scheme, wrong token) is rejected. The comparison is
/// against the full header value, so a token with embedded whitespace never
/// matches partially.
///
/// # Errors
///
/// Returns `StatusCode::UNAUTHORIZED` when the header does not match.
pub async fn bearer_auth_middleware(
    State(token): State<Arc<String>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let expected = format!("Bearer {token}");
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);

    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(request).await)
}

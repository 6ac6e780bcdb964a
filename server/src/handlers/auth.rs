use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;
use crate::utils::error::AppError;

/// Guards the admin routes with a static bearer token.
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))?;

    let Some(expected) = state.admin_token.as_deref() else {
        return Err(AppError::Forbidden("Admin access is disabled".to_string()));
    };

    if !tokens_match(presented.as_bytes(), expected.as_bytes()) {
        return Err(AppError::Forbidden("Invalid admin token".to_string()));
    }

    Ok(next.run(request).await)
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

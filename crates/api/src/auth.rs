//! `X-Api-Key` middleware guarding the `/v1` routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::{ApiError, AppState};

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if provided != Some(state.api_key.as_str()) {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}
